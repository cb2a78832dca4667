use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The slice of a fishing report the trophy ranking looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReportCandidate {
    pub id: i64,
    pub user_id: i64,
    pub fisherman_name: String,
    pub fish_species: Option<String>,
    pub fish_weight: Option<f64>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub is_public: bool,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ReportCandidate {
    pub fn is_trophy_eligible(&self) -> bool {
        self.is_public
            && self
                .fish_species
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportEventKind {
    Create,
    Update,
    Delete,
}

/// Notification emitted by the report CRUD side whenever a report changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub action: ReportEventKind,
    pub report_id: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub fish_species: Option<String>,
}

impl ReportEvent {
    /// Whether this event can change any month's ranking.
    pub fn affects_ranking(&self) -> bool {
        match self.action {
            ReportEventKind::Create => {
                self.is_public.unwrap_or(false)
                    && self
                        .fish_species
                        .as_deref()
                        .is_some_and(|s| !s.trim().is_empty())
            }
            ReportEventKind::Update | ReportEventKind::Delete => true,
        }
    }
}
