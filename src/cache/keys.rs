const SESSION_PREFIX: &str = "session:";
const USER_SESSIONS_PREFIX: &str = "user_sessions:";
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// Session key, addressed by token digest so raw tokens never sit in Redis.
pub fn session_key(digest: &str) -> String {
    format!("{}{}", SESSION_PREFIX, digest)
}

/// Set of session digests owned by a user.
pub fn user_sessions_key(user_id: i64) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}

pub fn rate_limit_key(key: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, key)
}
