pub mod report;
pub mod trophy;
pub mod user;

pub use report::{ReportCandidate, ReportEvent, ReportEventKind};
pub use trophy::{
    ArchivedMonth, AuditAction, InvalidMonth, MonthKey, TrophyAuditRecord, TrophyEntry,
};
pub use user::{NewUser, PublicUser, Session, User};
