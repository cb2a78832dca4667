//! In-memory store backends.
//!
//! Each store keeps its state behind a single `tokio::sync::Mutex`, so every
//! operation is atomic with respect to the others on the same store. Data is
//! lost on drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    AttemptStore, CounterState, ReportStore, ResetTokenRecord, SessionStore, StoreResult,
    TrophyStore, UserStore,
};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::models::{
    ArchivedMonth, MonthKey, NewUser, ReportCandidate, Session, TrophyAuditRecord, TrophyEntry,
    User,
};
use crate::utils::token_digest;

#[derive(Default)]
struct UserTables {
    next_id: i64,
    users: HashMap<i64, User>,
    /// digest -> record
    reset_tokens: HashMap<String, ResetTokenRecord>,
}

pub struct MemoryUserStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<UserTables>,
}

impl MemoryUserStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(UserTables::default()),
        }
    }

    pub async fn set_active(&self, user_id: i64, active: bool) {
        if let Some(user) = self.inner.lock().await.users.get_mut(&user_id) {
            user.active = active;
        }
    }

    pub async fn reset_token_count(&self, user_id: i64) -> usize {
        self.inner
            .lock()
            .await
            .reset_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.inner.lock().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Duplicate(format!("users.email = {}", new.email)));
        }
        tables.next_id += 1;
        let user = User {
            id: tables.next_id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            is_admin: new.is_admin,
            email_verified: false,
            email_verification_token: Some(new.verification_token_digest),
            email_verification_expires: Some(new.verification_expires),
            last_login: None,
            active: true,
            created_at: self.clock.now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_verification_token(&self, digest: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| !u.email_verified && u.email_verification_token.as_deref() == Some(digest))
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: i64, digest: &str) -> StoreResult<bool> {
        let mut tables = self.inner.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user)
                if !user.email_verified
                    && user.email_verification_token.as_deref() == Some(digest) =>
            {
                user.email_verified = true;
                user.email_verification_token = None;
                user.email_verification_expires = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_verification_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user) if !user.email_verified => {
                user.email_verification_token = Some(digest.to_string());
                user.email_verification_expires = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.inner.lock().await.users.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> StoreResult<Option<User>> {
        let mut tables = self.inner.lock().await;
        Ok(tables.users.get_mut(&user_id).map(|user| {
            user.is_admin = is_admin;
            user.clone()
        }))
    }

    async fn replace_reset_token(
        &self,
        user_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.inner.lock().await;
        tables.reset_tokens.retain(|_, r| r.user_id != user_id);
        tables.reset_tokens.insert(
            digest.to_string(),
            ResetTokenRecord {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn find_reset_token(&self, digest: &str) -> StoreResult<Option<ResetTokenRecord>> {
        Ok(self.inner.lock().await.reset_tokens.get(digest).cloned())
    }

    async fn complete_password_reset(
        &self,
        user_id: i64,
        digest: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.lock().await;
        let owned = tables
            .reset_tokens
            .get(digest)
            .is_some_and(|r| r.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        tables.reset_tokens.remove(digest);
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(true)
    }
}

/// Sessions keyed by token digest, mirroring the Redis layout.
pub struct MemorySessionStore {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn live_sessions_for(&self, user_id: i64) -> usize {
        let now = self.clock.now();
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .count()
    }
}

fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, token: &str, session: &Session, _ttl: Duration) -> StoreResult<()> {
        self.sessions
            .lock()
            .await
            .insert(token_digest(token), session.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let key = token_digest(token);
        let live = sessions.get(&key).filter(|s| s.expires_at > now).cloned();
        if live.is_none() {
            sessions.remove(&key);
        }
        Ok(live)
    }

    async fn renew(&self, token: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now();
        match self.sessions.lock().await.get_mut(&token_digest(token)) {
            Some(s) if s.expires_at > now => {
                s.expires_at = now + ttl_delta(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        self.sessions.lock().await.remove(&token_digest(token));
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: i64) -> StoreResult<usize> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - sessions.len())
    }
}

struct Window {
    count: u64,
    resets_at: DateTime<Utc>,
}

pub struct MemoryAttemptStore {
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryAttemptStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

fn remaining_secs(resets_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (resets_at - now).num_seconds().max(0) as u64
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<CounterState> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + ttl_delta(window),
        });
        if entry.resets_at <= now {
            entry.count = 0;
            entry.resets_at = now + ttl_delta(window);
        }
        entry.count += 1;
        Ok(CounterState {
            count: entry.count,
            resets_in_secs: remaining_secs(entry.resets_at, now),
        })
    }

    async fn peek(&self, key: &str) -> StoreResult<Option<CounterState>> {
        let now = self.clock.now();
        Ok(self
            .windows
            .lock()
            .await
            .get(key)
            .filter(|w| w.resets_at > now)
            .map(|w| CounterState {
                count: w.count,
                resets_in_secs: remaining_secs(w.resets_at, now),
            }))
    }

    async fn clear(&self, key: &str) -> StoreResult<()> {
        self.windows.lock().await.remove(key);
        Ok(())
    }
}

/// Stand-in for the report catalog owned by the report CRUD side.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<HashMap<i64, ReportCandidate>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, report: ReportCandidate) {
        self.reports.lock().await.insert(report.id, report);
    }

    pub async fn remove(&self, report_id: i64) -> Option<ReportCandidate> {
        self.reports.lock().await.remove(&report_id)
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn eligible_in_month(&self, month: MonthKey) -> StoreResult<Vec<ReportCandidate>> {
        Ok(self
            .reports
            .lock()
            .await
            .values()
            .filter(|r| r.is_trophy_eligible() && month.contains(r.created_at))
            .cloned()
            .collect())
    }

    async fn find(&self, report_id: i64) -> StoreResult<Option<ReportCandidate>> {
        Ok(self.reports.lock().await.get(&report_id).cloned())
    }
}

#[derive(Default)]
struct TrophyTables {
    current: HashMap<MonthKey, Vec<TrophyEntry>>,
    archive: HashMap<MonthKey, (Vec<TrophyEntry>, DateTime<Utc>)>,
    audit: Vec<TrophyAuditRecord>,
}

#[derive(Default)]
pub struct MemoryTrophyStore {
    inner: Mutex<TrophyTables>,
}

impl MemoryTrophyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut entries: Vec<TrophyEntry>) -> Vec<TrophyEntry> {
    entries.sort_by_key(|e| e.position);
    entries
}

#[async_trait]
impl TrophyStore for MemoryTrophyStore {
    async fn entries(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>> {
        let tables = self.inner.lock().await;
        Ok(sorted(tables.current.get(&month).cloned().unwrap_or_default()))
    }

    async fn replace_automatic(
        &self,
        month: MonthKey,
        entries: &[TrophyEntry],
    ) -> StoreResult<()> {
        let mut tables = self.inner.lock().await;
        let mut next: Vec<TrophyEntry> = tables
            .current
            .get(&month)
            .map(|v| v.iter().filter(|e| e.manual).cloned().collect())
            .unwrap_or_default();
        for entry in entries {
            if next.iter().any(|e| e.position == entry.position) {
                return Err(StoreError::Duplicate(format!(
                    "trophy_entries ({month}, {})",
                    entry.position
                )));
            }
            next.push(entry.clone());
        }
        tables.current.insert(month, next);
        Ok(())
    }

    async fn insert_manual(&self, entry: &TrophyEntry) -> StoreResult<()> {
        let mut tables = self.inner.lock().await;
        let month = tables.current.entry(entry.month).or_default();
        if month.iter().any(|e| e.position == entry.position) {
            return Err(StoreError::Duplicate(format!(
                "trophy_entries ({}, {})",
                entry.month, entry.position
            )));
        }
        month.push(entry.clone());
        Ok(())
    }

    async fn remove_manual(&self, month: MonthKey, position: i32) -> StoreResult<bool> {
        let mut tables = self.inner.lock().await;
        let Some(entries) = tables.current.get_mut(&month) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|e| !(e.manual && e.position == position));
        Ok(entries.len() != before)
    }

    async fn archive(&self, month: MonthKey, at: DateTime<Utc>) -> StoreResult<Option<usize>> {
        let mut tables = self.inner.lock().await;
        if tables.archive.get(&month).is_some_and(|(entries, _)| !entries.is_empty()) {
            return Ok(None);
        }
        let entries = sorted(tables.current.get(&month).cloned().unwrap_or_default());
        let count = entries.len();
        tables.archive.insert(month, (entries, at));
        Ok(Some(count))
    }

    async fn archived(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .archive
            .get(&month)
            .map(|(entries, _)| entries.clone())
            .unwrap_or_default())
    }

    async fn archived_months(&self) -> StoreResult<Vec<ArchivedMonth>> {
        let tables = self.inner.lock().await;
        let mut months: Vec<ArchivedMonth> = tables
            .archive
            .iter()
            .map(|(month, (entries, at))| ArchivedMonth {
                month: *month,
                entries: entries.len() as i64,
                archived_at: *at,
            })
            .collect();
        months.sort_by(|a, b| b.month.cmp(&a.month));
        Ok(months)
    }

    async fn record_audit(&self, record: &TrophyAuditRecord) -> StoreResult<()> {
        self.inner.lock().await.audit.push(record.clone());
        Ok(())
    }

    async fn audit_log(&self, limit: i64) -> StoreResult<Vec<TrophyAuditRecord>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
