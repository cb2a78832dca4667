mod auth;
mod error_handler;
mod rate_limit;

pub use auth::{
    AdminUser, CurrentUser, MaybeUser, SESSION_COOKIE, expired_session_cookie, session_cookie,
    session_token,
};
pub use error_handler::log_errors;
pub use rate_limit::{ClientIp, EndpointCategory, RateLimiter, rate_limit};
