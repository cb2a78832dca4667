use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{ArchivedMonth, MonthKey, TrophyAuditRecord, TrophyEntry};

#[derive(Debug, Default, Deserialize)]
pub struct TrophyQuery {
    pub action: Option<String>,
    pub month: Option<String>,
    pub limit: Option<i64>,
}

impl TrophyQuery {
    pub fn month(&self) -> AppResult<Option<MonthKey>> {
        match self.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: crate::models::InvalidMonth| AppError::InvalidInput(e.to_string())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrophiesResponse {
    pub success: bool,
    pub month: MonthKey,
    pub trophies: Vec<TrophyEntry>,
}

#[derive(Debug, Serialize)]
pub struct ArchivedMonthsResponse {
    pub success: bool,
    pub months: Vec<ArchivedMonth>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub success: bool,
    pub entries: Vec<TrophyAuditRecord>,
}

#[derive(Debug, Serialize)]
pub struct UpdateRankingResponse {
    pub success: bool,
    pub month: MonthKey,
    pub updated_entries: usize,
    pub trophies: Vec<TrophyEntry>,
}

#[derive(Debug, Serialize)]
pub struct MonthlyResetResponse {
    pub success: bool,
    pub archived_month: MonthKey,
    pub archived_count: usize,
    pub month: MonthKey,
    pub new_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ManualEntryResponse {
    pub success: bool,
    pub trophy: TrophyEntry,
}

#[derive(Debug, Deserialize)]
pub struct RemoveEntryRequest {
    #[serde(default)]
    pub month: Option<MonthKey>,
    pub position: i32,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub queued: bool,
}
