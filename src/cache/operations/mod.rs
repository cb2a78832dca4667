pub mod rate_limit;
pub mod session;

pub use rate_limit::RedisAttemptStore;
pub use session::RedisSessionStore;
