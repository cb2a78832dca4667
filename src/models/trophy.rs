use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;

#[derive(Debug, thiserror::Error)]
#[error("invalid month `{0}`, expected YYYY-MM")]
pub struct InvalidMonth(pub String);

/// A calendar month (UTC), rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    first_day: NaiveDate,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| MonthKey { first_day })
    }

    pub fn containing(at: DateTime<Utc>) -> Self {
        MonthKey {
            first_day: at.date_naive().with_day(1).unwrap_or(at.date_naive()),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn previous(&self) -> Self {
        match self.month() {
            1 => MonthKey::new(self.year() - 1, 12),
            m => MonthKey::new(self.year(), m - 1),
        }
        .unwrap_or(*self)
    }

    pub fn next(&self) -> Self {
        match self.month() {
            12 => MonthKey::new(self.year() + 1, 1),
            m => MonthKey::new(self.year(), m + 1),
        }
        .unwrap_or(*self)
    }

    /// Inclusive start instant.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day.and_time(chrono::NaiveTime::MIN))
    }

    /// Exclusive end instant: the start of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start() && at < self.end()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthKey {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = InvalidMonth;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrophyEntry {
    #[sqlx(try_from = "String")]
    pub month: MonthKey,
    pub position: i32,
    pub fisherman_name: String,
    pub fish_type: String,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub weight: Option<f64>,
    pub date: DateTime<Utc>,
    pub report_id: Option<i64>,
    /// Entered by an admin; kept in place across recomputes.
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ArchivedMonth {
    #[sqlx(try_from = "String")]
    pub month: MonthKey,
    pub entries: i64,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ManualUpdate,
    WebhookTriggered,
    MonthlyResetCron,
    MonthlyResetManual,
    ManualEntry,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ManualUpdate => "manual_update",
            AuditAction::WebhookTriggered => "webhook_triggered",
            AuditAction::MonthlyResetCron => "monthly_reset_cron",
            AuditAction::MonthlyResetManual => "monthly_reset_manual",
            AuditAction::ManualEntry => "manual_entry",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_update" => Ok(AuditAction::ManualUpdate),
            "webhook_triggered" => Ok(AuditAction::WebhookTriggered),
            "monthly_reset_cron" => Ok(AuditAction::MonthlyResetCron),
            "monthly_reset_manual" => Ok(AuditAction::MonthlyResetManual),
            "manual_entry" => Ok(AuditAction::ManualEntry),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrophyAuditRecord {
    pub action: AuditAction,
    pub month: MonthKey,
    pub updated_entries: usize,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}
