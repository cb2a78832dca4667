use serde::{Deserialize, Serialize};

/// Session payload stored in Redis. Expiry lives in the key TTL.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedSession {
    pub user_id: i64,
    pub created_at: i64, // Unix timestamp
}
