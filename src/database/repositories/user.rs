use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::map_unique;
use crate::models::{NewUser, User};
use crate::store::{ResetTokenRecord, StoreResult, UserStore};

const USER_COLUMNS: &str = r#"
    id, name, email, password_hash, is_admin, email_verified,
    email_verification_token, email_verification_expires,
    last_login, active, created_at
"#;

/// Users and password-reset tokens in Postgres.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, is_admin, email_verified,
                               email_verification_token, email_verification_expires)
            VALUES ($1, $2, $3, $4, false, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.is_admin)
            .bind(&new.verification_token_digest)
            .bind(new.verification_expires)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "users.email"))?;

        tracing::debug!("Created user {}", user.id);
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_verification_token(&self, digest: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE email_verification_token = $1 AND email_verified = false
            "#
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn mark_email_verified(&self, user_id: i64, digest: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = true,
                email_verification_token = NULL,
                email_verification_expires = NULL
            WHERE id = $1 AND email_verification_token = $2 AND email_verified = false
            "#,
        )
        .bind(user_id)
        .bind(digest)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_verification_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verification_token = $2, email_verification_expires = $3
            WHERE id = $1 AND email_verified = false
            "#,
        )
        .bind(user_id)
        .bind(digest)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<Option<User>> {
        let sql = format!("UPDATE users SET is_admin = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(is_admin)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn replace_reset_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent requests for the same user on the user row.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO password_reset_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(digest)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_reset_token(&self, digest: &str) -> StoreResult<Option<ResetTokenRecord>> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, expires_at FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, expires_at)| ResetTokenRecord {
            user_id,
            expires_at,
        }))
    }

    async fn complete_password_reset(
        &self,
        user_id: i64,
        digest: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE token_hash = $1 AND user_id = $2",
        )
        .bind(digest)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
