use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{MonthKey, ReportCandidate};
use crate::store::{ReportStore, StoreResult};

const CANDIDATE_SELECT: &str = r#"
    SELECT
        r.id,
        r.user_id,
        u.name AS fisherman_name,
        r.fish_species,
        r.fish_weight::float8 AS fish_weight,
        COALESCE(l.name, r.custom_location) AS location,
        r.images[1] AS image_url,
        r.is_public,
        r.likes_count::int8 AS likes_count,
        r.created_at
    FROM reports r
    JOIN users u ON u.id = r.user_id
    LEFT JOIN locations l ON l.id = r.location_id
"#;

/// Read-only view over the report catalog.
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn eligible_in_month(&self, month: MonthKey) -> StoreResult<Vec<ReportCandidate>> {
        let sql = format!(
            r#"{CANDIDATE_SELECT}
            WHERE r.is_public = true
              AND r.fish_species IS NOT NULL
              AND btrim(r.fish_species) <> ''
              AND r.created_at >= $1
              AND r.created_at < $2
            "#
        );
        Ok(sqlx::query_as::<_, ReportCandidate>(&sql)
            .bind(month.start())
            .bind(month.end())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find(&self, report_id: i64) -> StoreResult<Option<ReportCandidate>> {
        let sql = format!("{CANDIDATE_SELECT} WHERE r.id = $1");
        Ok(sqlx::query_as::<_, ReportCandidate>(&sql)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
