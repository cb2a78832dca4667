use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::rate_limit_key;
use crate::store::{AttemptStore, CounterState, StoreResult};

/// Fixed-window counters on Redis `INCR`, atomic per key.
pub struct RedisAttemptStore {
    redis: Arc<RedisClient>,
}

impl RedisAttemptStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<CounterState> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = rate_limit_key(key);
        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;

        // First hit of the window (or a key that lost its TTL): open the window.
        if count == 1 || ttl < 0 {
            let _: () = conn.expire(&key, window.as_secs() as i64).await?;
            return Ok(CounterState {
                count,
                resets_in_secs: window.as_secs(),
            });
        }

        Ok(CounterState {
            count,
            resets_in_secs: ttl as u64,
        })
    }

    async fn peek(&self, key: &str) -> StoreResult<Option<CounterState>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = rate_limit_key(key);
        let (count, ttl): (Option<u64>, i64) = redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;

        Ok(count.map(|count| CounterState {
            count,
            resets_in_secs: ttl.max(0) as u64,
        }))
    }

    async fn clear(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(rate_limit_key(key)).await?;
        Ok(())
    }
}
