//! Persistence seams.
//!
//! Services only ever see these traits. Postgres and Redis back them in
//! production (`database`, `cache`); `memory` backs them in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{
    ArchivedMonth, MonthKey, NewUser, ReportCandidate, Session, TrophyAuditRecord, TrophyEntry,
    User,
};

pub mod memory;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResetTokenRecord {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Credential store: users plus their verification and reset tokens.
/// Token arguments are always digests, never raw tokens.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Only matches accounts that are still unverified.
    async fn find_by_verification_token(&self, digest: &str) -> StoreResult<Option<User>>;
    /// Flip to verified and clear the token, if `digest` still matches.
    async fn mark_email_verified(&self, user_id: i64, digest: &str) -> StoreResult<bool>;
    /// Swap in a fresh verification token for an unverified account.
    async fn replace_verification_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<Option<User>>;

    /// Drop every reset token of the user and store a single new one.
    async fn replace_reset_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn find_reset_token(&self, digest: &str) -> StoreResult<Option<ResetTokenRecord>>;
    /// Consume the token and set the new hash in one step. `false` when the
    /// token was already gone.
    async fn complete_password_reset(
        &self,
        user_id: i64,
        digest: &str,
        password_hash: &str,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, token: &str, session: &Session, ttl: Duration) -> StoreResult<()>;
    async fn get(&self, token: &str) -> StoreResult<Option<Session>>;
    /// Push the expiry forward. `false` when the session no longer exists.
    async fn renew(&self, token: &str, ttl: Duration) -> StoreResult<bool>;
    async fn delete(&self, token: &str) -> StoreResult<()>;
    async fn delete_all_for_user(&self, user_id: i64) -> StoreResult<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub count: u64,
    pub resets_in_secs: u64,
}

/// Fixed-window counters keyed by arbitrary strings.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Increment and return the new state. The window opens on the first hit.
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<CounterState>;
    async fn peek(&self, key: &str) -> StoreResult<Option<CounterState>>;
    async fn clear(&self, key: &str) -> StoreResult<()>;
}

/// Read side of the report catalog.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn eligible_in_month(&self, month: MonthKey) -> StoreResult<Vec<ReportCandidate>>;
    async fn find(&self, report_id: i64) -> StoreResult<Option<ReportCandidate>>;
}

#[async_trait]
pub trait TrophyStore: Send + Sync {
    async fn entries(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>>;
    /// Atomically replace the automatic entries of `month`. Manual entries stay.
    async fn replace_automatic(&self, month: MonthKey, entries: &[TrophyEntry])
    -> StoreResult<()>;
    /// Fails with [`StoreError::Duplicate`] when the position is taken.
    async fn insert_manual(&self, entry: &TrophyEntry) -> StoreResult<()>;
    async fn remove_manual(&self, month: MonthKey, position: i32) -> StoreResult<bool>;
    /// Snapshot the month into the archive. Snapshots are never replaced:
    /// `None` when the month already has one.
    async fn archive(&self, month: MonthKey, at: DateTime<Utc>) -> StoreResult<Option<usize>>;
    async fn archived(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>>;
    async fn archived_months(&self) -> StoreResult<Vec<ArchivedMonth>>;
    async fn record_audit(&self, record: &TrophyAuditRecord) -> StoreResult<()>;
    async fn audit_log(&self, limit: i64) -> StoreResult<Vec<TrophyAuditRecord>>;
}
