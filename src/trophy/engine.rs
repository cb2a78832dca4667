use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ranking::rank;
use crate::clock::Clock;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{
    ArchivedMonth, AuditAction, MonthKey, ReportEvent, TrophyAuditRecord, TrophyEntry,
};
use crate::store::{ReportStore, TrophyStore};

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub month: MonthKey,
    pub updated_entries: usize,
    pub entries: Vec<TrophyEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    pub archived_month: MonthKey,
    pub archived_count: usize,
    pub month: MonthKey,
    pub new_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTrigger {
    Cron,
    Manual,
}

/// Admin-entered trophy, pinned at its position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualEntryInput {
    #[serde(default)]
    pub month: Option<MonthKey>,
    pub position: i32,
    pub fisherman_name: String,
    pub fish_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub report_id: Option<i64>,
}

/// Keeps the monthly top-N board in sync with the report catalog.
#[derive(Clone)]
pub struct TrophyEngine {
    reports: Arc<dyn ReportStore>,
    trophies: Arc<dyn TrophyStore>,
    clock: Arc<dyn Clock>,
    top_n: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TrophyEngine {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        trophies: Arc<dyn TrophyStore>,
        clock: Arc<dyn Clock>,
        top_n: usize,
    ) -> Self {
        Self {
            reports,
            trophies,
            clock,
            top_n: top_n.max(1),
        }
    }

    pub fn current_month(&self) -> MonthKey {
        MonthKey::containing(self.clock.now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn current(&self) -> AppResult<Vec<TrophyEntry>> {
        self.month_entries(self.current_month()).await
    }

    pub async fn month_entries(&self, month: MonthKey) -> AppResult<Vec<TrophyEntry>> {
        Ok(self.trophies.entries(month).await?)
    }

    /// Rebuild the automatic part of `month` from the eligible reports.
    pub async fn recompute(
        &self,
        month: MonthKey,
        action: AuditAction,
        actor: &str,
    ) -> AppResult<RecomputeOutcome> {
        let pinned: Vec<TrophyEntry> = self
            .trophies
            .entries(month)
            .await?
            .into_iter()
            .filter(|e| e.manual)
            .collect();
        let candidates = self.reports.eligible_in_month(month).await?;
        let automatic = rank(month, candidates, &pinned, self.top_n);

        match self.trophies.replace_automatic(month, &automatic).await {
            Ok(()) => {}
            // A manual entry landed between reading the pins and writing.
            Err(StoreError::Duplicate(what)) => {
                return Err(AppError::Conflict(format!(
                    "Ranking for {month} changed during recompute ({what}), try again"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.audit(action, month, automatic.len(), actor).await?;
        tracing::info!(
            "Recomputed trophies for {} ({}): {} automatic, {} pinned",
            month,
            action.as_str(),
            automatic.len(),
            pinned.len()
        );

        Ok(RecomputeOutcome {
            month,
            updated_entries: automatic.len(),
            entries: self.trophies.entries(month).await?,
        })
    }

    /// Close the previous month into the archive and rank the current one.
    pub async fn monthly_reset(&self, actor: &str, trigger: ResetTrigger) -> AppResult<ResetOutcome> {
        let action = match trigger {
            ResetTrigger::Cron => AuditAction::MonthlyResetCron,
            ResetTrigger::Manual => AuditAction::MonthlyResetManual,
        };
        let month = self.current_month();
        let archived_month = month.previous();

        // An archived month is closed: a re-run keeps its snapshot as is.
        let existing = self.trophies.archived(archived_month).await?;
        let archived_count = if existing.is_empty() {
            // Final pass so late report changes make it into the snapshot.
            self.recompute(archived_month, action, actor).await?;
            match self.trophies.archive(archived_month, self.clock.now()).await? {
                Some(count) => count,
                None => self.trophies.archived(archived_month).await?.len(),
            }
        } else {
            tracing::info!(
                "Trophies of {} are already archived, keeping the snapshot",
                archived_month
            );
            existing.len()
        };
        let current = self.recompute(month, action, actor).await?;

        tracing::info!(
            "Monthly trophy reset by {}: archived {} entries of {}, {} new entries for {}",
            actor,
            archived_count,
            archived_month,
            current.entries.len(),
            month
        );
        Ok(ResetOutcome {
            archived_month,
            archived_count,
            month,
            new_count: current.entries.len(),
        })
    }

    pub async fn add_manual(&self, actor: &str, input: ManualEntryInput) -> AppResult<TrophyEntry> {
        if input.position < 1 || input.position as usize > self.top_n {
            return Err(AppError::InvalidInput(format!(
                "Position must be between 1 and {}",
                self.top_n
            )));
        }
        let fisherman_name = non_empty(Some(input.fisherman_name))
            .ok_or_else(|| AppError::InvalidInput("Fisherman name is required".into()))?;
        let fish_type = non_empty(Some(input.fish_type))
            .ok_or_else(|| AppError::InvalidInput("Fish type is required".into()))?;
        if input.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
            return Err(AppError::InvalidInput("Weight must be a positive number".into()));
        }

        let month = input.month.unwrap_or_else(|| self.current_month());
        let occupied = self
            .trophies
            .entries(month)
            .await?
            .iter()
            .any(|e| e.position == input.position);
        if occupied {
            return Err(AppError::Conflict(format!(
                "Position {} is already taken for {}",
                input.position, month
            )));
        }

        let entry = TrophyEntry {
            month,
            position: input.position,
            fisherman_name,
            fish_type,
            location: non_empty(input.location),
            image_url: non_empty(input.image_url),
            weight: input.weight,
            date: input.date.unwrap_or_else(|| self.clock.now()),
            report_id: input.report_id,
            manual: true,
        };
        match self.trophies.insert_manual(&entry).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::Conflict(format!(
                    "Position {} is already taken for {}",
                    entry.position, month
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.audit(AuditAction::ManualEntry, month, 1, actor).await?;
        tracing::info!(
            "Manual trophy entry at {} #{} added by {}",
            month,
            entry.position,
            actor
        );
        Ok(entry)
    }

    pub async fn remove_manual(&self, actor: &str, month: MonthKey, position: i32) -> AppResult<()> {
        if !self.trophies.remove_manual(month, position).await? {
            return Err(AppError::NotFound(format!(
                "No manual entry at position {position} for {month}"
            )));
        }
        self.audit(AuditAction::ManualEntry, month, 1, actor).await?;
        tracing::info!("Manual trophy entry at {} #{} removed by {}", month, position, actor);
        Ok(())
    }

    pub async fn archived(&self, month: MonthKey) -> AppResult<Vec<TrophyEntry>> {
        Ok(self.trophies.archived(month).await?)
    }

    pub async fn archived_months(&self) -> AppResult<Vec<ArchivedMonth>> {
        Ok(self.trophies.archived_months().await?)
    }

    pub async fn audit_log(&self, limit: i64) -> AppResult<Vec<TrophyAuditRecord>> {
        Ok(self.trophies.audit_log(limit.clamp(1, 500)).await?)
    }

    /// React to a report change. `None` when the change cannot move any ranking.
    pub async fn handle_event(&self, event: &ReportEvent) -> AppResult<Option<RecomputeOutcome>> {
        if !event.affects_ranking() {
            return Ok(None);
        }
        let month = match event.created_at {
            Some(at) => MonthKey::containing(at),
            None => match self.reports.find(event.report_id).await? {
                Some(report) => MonthKey::containing(report.created_at),
                None => self.current_month(),
            },
        };
        let actor = format!("report:{}", event.report_id);
        self.recompute(month, AuditAction::WebhookTriggered, &actor)
            .await
            .map(Some)
    }

    async fn audit(
        &self,
        action: AuditAction,
        month: MonthKey,
        updated_entries: usize,
        actor: &str,
    ) -> AppResult<()> {
        let record = TrophyAuditRecord {
            action,
            month,
            updated_entries,
            actor: actor.to_string(),
            created_at: self.clock.now(),
        };
        Ok(self.trophies.record_audit(&record).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ReportCandidate, ReportEventKind};
    use crate::store::memory::{MemoryReportStore, MemoryTrophyStore};
    use chrono::{Duration, TimeZone};

    struct Harness {
        engine: TrophyEngine,
        reports: Arc<MemoryReportStore>,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap());
        let reports = Arc::new(MemoryReportStore::new());
        let engine = TrophyEngine::new(
            reports.clone(),
            Arc::new(MemoryTrophyStore::new()),
            Arc::new(clock.clone()),
            10,
        );
        Harness {
            engine,
            reports,
            clock,
        }
    }

    fn report(id: i64, weight: Option<f64>, likes: i64, day: u32) -> ReportCandidate {
        ReportCandidate {
            id,
            user_id: id,
            fisherman_name: format!("Pescador {id}"),
            fish_species: Some("Dourado".into()),
            fish_weight: weight,
            location: None,
            image_url: None,
            is_public: true,
            likes_count: likes,
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
        }
    }

    fn may() -> MonthKey {
        MonthKey::new(2024, 5).unwrap()
    }

    fn order(entries: &[TrophyEntry]) -> Vec<i64> {
        entries.iter().filter_map(|e| e.report_id).collect()
    }

    fn manual(position: i32) -> ManualEntryInput {
        ManualEntryInput {
            month: Some(may()),
            position,
            fisherman_name: "Seu Zé".into(),
            fish_type: "Pintado".into(),
            location: Some("Pantanal".into()),
            image_url: None,
            weight: Some(12.5),
            date: None,
            report_id: None,
        }
    }

    #[tokio::test]
    async fn recompute_is_idempotent_and_audited() {
        let h = harness();
        h.reports.upsert(report(1, Some(5.0), 2, 3)).await;
        h.reports.upsert(report(2, Some(5.0), 5, 4)).await;
        h.reports.upsert(report(3, None, 100, 5)).await;
        h.reports.upsert(report(4, Some(8.0), 0, 6)).await;

        let first = h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();
        let second = h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();
        assert_eq!(order(&first.entries), vec![4, 2, 1, 3]);
        assert_eq!(first.entries, second.entries);
        assert_eq!(first.updated_entries, 4);

        let log = h.engine.audit_log(10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, AuditAction::ManualUpdate);
        assert_eq!(log[0].actor, "admin");
        assert_eq!(log[0].updated_entries, 4);
    }

    #[tokio::test]
    async fn empty_month_yields_empty_board() {
        let h = harness();
        let outcome = h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();
        assert_eq!(outcome.updated_entries, 0);
        assert!(outcome.entries.is_empty());
    }

    #[tokio::test]
    async fn deleting_the_leader_promotes_the_runner_up() {
        let h = harness();
        h.reports.upsert(report(1, Some(9.0), 0, 3)).await;
        h.reports.upsert(report(2, Some(7.0), 0, 3)).await;
        h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();

        h.reports.remove(1).await;
        let outcome = h
            .engine
            .handle_event(&ReportEvent {
                action: ReportEventKind::Delete,
                report_id: 1,
                created_at: Some(report(1, None, 0, 3).created_at),
                is_public: None,
                fish_species: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.entries[0].report_id, Some(2));
        assert_eq!(outcome.entries[0].position, 1);
    }

    #[tokio::test]
    async fn making_the_leader_private_drops_it() {
        let h = harness();
        h.reports.upsert(report(1, Some(9.0), 0, 3)).await;
        h.reports.upsert(report(2, Some(7.0), 0, 3)).await;
        h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();

        let mut hidden = report(1, Some(9.0), 0, 3);
        hidden.is_public = false;
        h.reports.upsert(hidden).await;
        let outcome = h
            .engine
            .handle_event(&ReportEvent {
                action: ReportEventKind::Update,
                report_id: 1,
                created_at: None,
                is_public: Some(false),
                fish_species: Some("Dourado".into()),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order(&outcome.entries), vec![2]);
    }

    #[tokio::test]
    async fn ineligible_create_events_are_ignored() {
        let h = harness();
        let event = ReportEvent {
            action: ReportEventKind::Create,
            report_id: 9,
            created_at: None,
            is_public: Some(false),
            fish_species: Some("Dourado".into()),
        };
        assert!(h.engine.handle_event(&event).await.unwrap().is_none());
        assert!(h.engine.audit_log(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_entries_conflict_and_survive_recompute() {
        let h = harness();
        h.reports.upsert(report(1, Some(9.0), 0, 3)).await;
        h.reports.upsert(report(2, Some(7.0), 0, 3)).await;
        h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();

        // Position 1 is held by the automatic leader.
        assert!(matches!(
            h.engine.add_manual("admin", manual(1)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            h.engine.add_manual("admin", manual(11)).await,
            Err(AppError::InvalidInput(_))
        ));

        h.engine.add_manual("admin", manual(5)).await.unwrap();
        assert!(matches!(
            h.engine.add_manual("admin", manual(5)).await,
            Err(AppError::Conflict(_))
        ));

        let outcome = h.engine.recompute(may(), AuditAction::ManualUpdate, "admin").await.unwrap();
        assert_eq!(outcome.entries.len(), 3);
        let pinned = outcome.entries.iter().find(|e| e.manual).unwrap();
        assert_eq!(pinned.position, 5);
        assert_eq!(pinned.fisherman_name, "Seu Zé");

        h.engine.remove_manual("admin", may(), 5).await.unwrap();
        assert!(matches!(
            h.engine.remove_manual("admin", may(), 5).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(h.engine.month_entries(may()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn monthly_reset_archives_previous_month() {
        let h = harness();
        h.reports.upsert(report(1, Some(9.0), 0, 3)).await;
        h.reports.upsert(report(2, Some(7.0), 0, 3)).await;
        h.engine.recompute(may(), AuditAction::WebhookTriggered, "report:1").await.unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 5).unwrap());
        let mut june = report(3, Some(2.0), 0, 1);
        june.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 1).unwrap();
        h.reports.upsert(june).await;

        let outcome = h.engine.monthly_reset("cron", ResetTrigger::Cron).await.unwrap();
        assert_eq!(outcome.archived_month, may());
        assert_eq!(outcome.archived_count, 2);
        assert_eq!(outcome.month.to_string(), "2024-06");
        assert_eq!(outcome.new_count, 1);

        assert_eq!(order(&h.engine.archived(may()).await.unwrap()), vec![1, 2]);
        let months = h.engine.archived_months().await.unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].entries, 2);
        assert_eq!(order(&h.engine.current().await.unwrap()), vec![3]);

        // Running again in the same month keeps the archive intact.
        h.clock.advance(Duration::days(3));
        h.engine.monthly_reset("admin", ResetTrigger::Manual).await.unwrap();
        assert_eq!(h.engine.archived(may()).await.unwrap().len(), 2);
        assert_eq!(
            h.engine.audit_log(1).await.unwrap()[0].action,
            AuditAction::MonthlyResetManual
        );
    }

    #[tokio::test]
    async fn rerun_after_reports_vanish_keeps_the_snapshot() {
        let h = harness();
        h.reports.upsert(report(1, Some(4.5), 2, 10)).await;

        h.clock.set(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 30).unwrap());
        let first = h.engine.monthly_reset("cron", ResetTrigger::Cron).await.unwrap();
        assert_eq!(first.archived_count, 1);

        // The only May report is deleted after the month was closed.
        h.reports.remove(1).await;
        h.clock.set(Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap());
        let rerun = h.engine.monthly_reset("chefe@gmail.com", ResetTrigger::Manual).await.unwrap();

        assert_eq!(rerun.archived_month, may());
        assert_eq!(rerun.archived_count, 1);
        assert_eq!(order(&h.engine.archived(may()).await.unwrap()), vec![1]);
        assert_eq!(h.engine.archived_months().await.unwrap()[0].entries, 1);
        assert_eq!(order(&h.engine.month_entries(may()).await.unwrap()), vec![1]);
    }
}
