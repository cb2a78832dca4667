pub mod mailer;
pub mod password;
pub mod rate_limit;
pub mod service;

pub use mailer::{HttpMailer, LogMailer, Mailer, OutgoingEmail, RecordingMailer};
pub use rate_limit::LoginThrottle;
pub use service::{AuthService, LoginOutcome, RegisterOutcome};
