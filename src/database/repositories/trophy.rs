use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::map_unique;
use crate::models::{ArchivedMonth, MonthKey, TrophyAuditRecord, TrophyEntry};
use crate::store::{StoreResult, TrophyStore};

const ENTRY_COLUMNS: &str = r#"
    month, position, fisherman_name, fish_type, location,
    image_url, weight, date, report_id, manual
"#;

/// Current rankings, monthly archive and audit trail in Postgres.
pub struct PgTrophyStore {
    pool: PgPool,
}

impl PgTrophyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Every writer of a month's ranking takes this lock first, so concurrent
/// recomputes and manual edits serialize instead of interleaving.
async fn lock_month(tx: &mut Transaction<'_, Postgres>, month: MonthKey) -> sqlx::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('trophy:' || $1))")
        .bind(month.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &TrophyEntry,
) -> sqlx::Result<()> {
    sqlx::query(&format!(
        "INSERT INTO trophy_entries ({ENTRY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(entry.month.to_string())
    .bind(entry.position)
    .bind(&entry.fisherman_name)
    .bind(&entry.fish_type)
    .bind(&entry.location)
    .bind(&entry.image_url)
    .bind(entry.weight)
    .bind(entry.date)
    .bind(entry.report_id)
    .bind(entry.manual)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    action: String,
    month: String,
    updated_entries: i32,
    actor: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl TrophyStore for PgTrophyStore {
    async fn entries(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM trophy_entries WHERE month = $1 ORDER BY position");
        Ok(sqlx::query_as::<_, TrophyEntry>(&sql)
            .bind(month.to_string())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn replace_automatic(
        &self,
        month: MonthKey,
        entries: &[TrophyEntry],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_month(&mut tx, month).await?;

        sqlx::query("DELETE FROM trophy_entries WHERE month = $1 AND manual = false")
            .bind(month.to_string())
            .execute(&mut *tx)
            .await?;
        for entry in entries {
            insert_entry(&mut tx, entry)
                .await
                .map_err(|e| map_unique(e, "trophy_entries (month, position)"))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_manual(&self, entry: &TrophyEntry) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_month(&mut tx, entry.month).await?;
        insert_entry(&mut tx, entry)
            .await
            .map_err(|e| map_unique(e, "trophy_entries (month, position)"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_manual(&self, month: MonthKey, position: i32) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_month(&mut tx, month).await?;
        let result = sqlx::query(
            "DELETE FROM trophy_entries WHERE month = $1 AND position = $2 AND manual = true",
        )
        .bind(month.to_string())
        .bind(position)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn archive(&self, month: MonthKey, at: DateTime<Utc>) -> StoreResult<Option<usize>> {
        let mut tx = self.pool.begin().await?;
        lock_month(&mut tx, month).await?;

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM trophy_archive WHERE month = $1)")
                .bind(month.to_string())
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            tx.rollback().await?;
            return Ok(None);
        }
        let copied = sqlx::query(&format!(
            r#"
            INSERT INTO trophy_archive ({ENTRY_COLUMNS}, archived_at)
            SELECT {ENTRY_COLUMNS}, $2 FROM trophy_entries WHERE month = $1
            "#
        ))
        .bind(month.to_string())
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(copied.rows_affected() as usize))
    }

    async fn archived(&self, month: MonthKey) -> StoreResult<Vec<TrophyEntry>> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM trophy_archive WHERE month = $1 ORDER BY position");
        Ok(sqlx::query_as::<_, TrophyEntry>(&sql)
            .bind(month.to_string())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn archived_months(&self) -> StoreResult<Vec<ArchivedMonth>> {
        Ok(sqlx::query_as::<_, ArchivedMonth>(
            r#"
            SELECT month, COUNT(*) AS entries, MAX(archived_at) AS archived_at
            FROM trophy_archive
            GROUP BY month
            ORDER BY month DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_audit(&self, record: &TrophyAuditRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trophy_audit_log (action, month, updated_entries, actor, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.action.as_str())
        .bind(record.month.to_string())
        .bind(record.updated_entries as i32)
        .bind(&record.actor)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_log(&self, limit: i64) -> StoreResult<Vec<TrophyAuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT action, month, updated_entries, actor, created_at
            FROM trophy_audit_log
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let action = row.action.parse().ok()?;
                let month = row.month.parse().ok()?;
                Some(TrophyAuditRecord {
                    action,
                    month,
                    updated_entries: row.updated_entries.max(0) as usize,
                    actor: row.actor,
                    created_at: row.created_at,
                })
            })
            .collect())
    }
}
