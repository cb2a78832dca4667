pub mod engine;
pub mod events;
pub mod ranking;
pub mod scheduler;

pub use engine::{ManualEntryInput, RecomputeOutcome, ResetOutcome, ResetTrigger, TrophyEngine};
pub use events::{ReportEvents, run_worker};
pub use scheduler::run_monthly_reset;
