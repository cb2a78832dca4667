// Redis-backed stores: sessions and fixed-window counters.

pub mod keys;
pub mod models;
pub mod operations;

pub use operations::rate_limit::RedisAttemptStore;
pub use operations::session::RedisSessionStore;
