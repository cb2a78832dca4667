pub mod report;
pub mod trophy;
pub mod user;

pub use report::PgReportStore;
pub use trophy::PgTrophyStore;
pub use user::PgUserStore;
