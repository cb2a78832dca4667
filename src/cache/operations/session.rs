use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::{session_key, user_sessions_key};
use crate::cache::models::CachedSession;
use crate::models::Session;
use crate::store::{SessionStore, StoreResult};
use crate::utils::token_digest;

/// Sessions in Redis: one key per session plus a per-user index set.
pub struct RedisSessionStore {
    redis: Arc<RedisClient>,
}

impl RedisSessionStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, token: &str, session: &Session, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let digest = token_digest(token);
        let cached = CachedSession {
            user_id: session.user_id,
            created_at: session.created_at.timestamp(),
        };
        let json = serde_json::to_string(&cached)?;
        let index = user_sessions_key(session.user_id);

        let _: () = redis::pipe()
            .atomic()
            .set_ex(session_key(&digest), json, ttl.as_secs())
            .ignore()
            .sadd(&index, &digest)
            .ignore()
            .expire(&index, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<Session>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = session_key(&token_digest(token));
        let (raw, ttl): (Option<String>, i64) = redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;

        let Some(json) = raw else {
            return Ok(None);
        };
        // -2: gone between the two commands; -1: no expiry, which we never set.
        if ttl < 0 {
            return Ok(None);
        }
        let cached: CachedSession = serde_json::from_str(&json)?;
        let now = Utc::now();
        Ok(Some(Session {
            user_id: cached.user_id,
            created_at: Utc
                .timestamp_opt(cached.created_at, 0)
                .single()
                .unwrap_or(now),
            expires_at: now + chrono::Duration::seconds(ttl),
        }))
    }

    async fn renew(&self, token: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let digest = token_digest(token);
        let key = session_key(&digest);
        let raw: Option<String> = conn.get(&key).await?;
        let Some(cached) = raw
            .as_deref()
            .and_then(|json| serde_json::from_str::<CachedSession>(json).ok())
        else {
            return Ok(false);
        };

        // The index has to live at least as long as any session in it, or
        // logout-everywhere misses sessions kept alive by renewal.
        let index = user_sessions_key(cached.user_id);
        let secs = ttl.as_secs() as i64;
        let (renewed,): (bool,) = redis::pipe()
            .atomic()
            .expire(&key, secs)
            .sadd(&index, &digest)
            .ignore()
            .expire(&index, secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(renewed)
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let digest = token_digest(token);
        let key = session_key(&digest);
        let raw: Option<String> = conn.get(&key).await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if let Some(cached) = raw
            .as_deref()
            .and_then(|json| serde_json::from_str::<CachedSession>(json).ok())
        {
            pipe.srem(user_sessions_key(cached.user_id), &digest).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: i64) -> StoreResult<usize> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let index = user_sessions_key(user_id);
        let digests: Vec<String> = conn.smembers(&index).await?;
        let keys: Vec<String> = digests.iter().map(|d| session_key(d)).collect();

        if keys.is_empty() {
            let _: () = conn.del(&index).await?;
            return Ok(0);
        }
        let (removed,): (usize,) = redis::pipe()
            .atomic()
            .del(&keys)
            .del(&index)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_token;

    fn store() -> (RedisSessionStore, Arc<RedisClient>) {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let client = Arc::new(RedisClient::open(url).unwrap());
        (RedisSessionStore::new(client.clone()), client)
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn renewal_keeps_the_user_index_alive() {
        let (store, client) = store();
        let user_id = 900_000 + (rand::random::<u32>() % 100_000) as i64;
        let token = generate_token();
        let now = Utc::now();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(5),
        };
        store.create(&token, &session, Duration::from_secs(5)).await.unwrap();
        assert!(store.renew(&token, Duration::from_secs(600)).await.unwrap());

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let index_ttl: i64 = conn.ttl(user_sessions_key(user_id)).await.unwrap();
        assert!(index_ttl > 5, "index ttl {index_ttl}");

        assert_eq!(store.delete_all_for_user(user_id).await.unwrap(), 1);
        assert!(store.get(&token).await.unwrap().is_none());
        assert!(!store.renew(&token, Duration::from_secs(600)).await.unwrap());
    }
}
