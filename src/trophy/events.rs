//! In-process bus carrying report lifecycle events to the trophy engine.

use tokio::sync::mpsc;

use super::engine::TrophyEngine;
use crate::models::ReportEvent;

/// Publishing half. Cheap to clone; never blocks the publisher.
#[derive(Clone)]
pub struct ReportEvents {
    tx: mpsc::UnboundedSender<ReportEvent>,
}

impl ReportEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event. Returns false if the worker is gone; the next
    /// scheduled or manual recompute picks the change up instead.
    pub fn publish(&self, event: ReportEvent) -> bool {
        let report_id = event.report_id;
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!("Trophy worker is not running, dropped event for report {}", report_id);
                false
            }
        }
    }
}

pub async fn run_worker(engine: TrophyEngine, mut rx: mpsc::UnboundedReceiver<ReportEvent>) {
    tracing::info!("Trophy event worker started");
    while let Some(event) = rx.recv().await {
        match engine.handle_event(&event).await {
            Ok(Some(outcome)) => tracing::debug!(
                "Report {} {:?}: {} ranked for {}",
                event.report_id,
                event.action,
                outcome.updated_entries,
                outcome.month
            ),
            Ok(None) => tracing::debug!(
                "Report {} {:?} does not affect the ranking",
                event.report_id,
                event.action
            ),
            Err(e) => tracing::error!(
                "Trophy recompute for report {} {:?} failed: {}",
                event.report_id,
                event.action,
                e
            ),
        }
    }
    tracing::info!("Trophy event worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ReportCandidate, ReportEventKind};
    use crate::store::memory::{MemoryReportStore, MemoryTrophyStore};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn worker_recomputes_and_stops_when_publishers_drop() {
        let now = Utc.with_ymd_and_hms(2024, 8, 15, 10, 0, 0).unwrap();
        let reports = Arc::new(MemoryReportStore::new());
        reports
            .upsert(ReportCandidate {
                id: 1,
                user_id: 1,
                fisherman_name: "Ana".into(),
                fish_species: Some("Traíra".into()),
                fish_weight: Some(1.2),
                location: None,
                image_url: None,
                is_public: true,
                likes_count: 0,
                created_at: now,
            })
            .await;
        let engine = TrophyEngine::new(
            reports,
            Arc::new(MemoryTrophyStore::new()),
            Arc::new(ManualClock::new(now)),
            10,
        );

        let (events, rx) = ReportEvents::channel();
        let handle = tokio::spawn(run_worker(engine.clone(), rx));
        assert!(events.publish(ReportEvent {
            action: ReportEventKind::Create,
            report_id: 1,
            created_at: Some(now),
            is_public: Some(true),
            fish_species: Some("Traíra".into()),
        }));
        drop(events);
        handle.await.unwrap();

        let current = engine.current().await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].report_id, Some(1));
    }

    #[tokio::test]
    async fn publish_reports_a_missing_worker() {
        let (events, rx) = ReportEvents::channel();
        drop(rx);
        assert!(!events.publish(ReportEvent {
            action: ReportEventKind::Delete,
            report_id: 3,
            created_at: None,
            is_public: None,
            fish_species: None,
        }));
    }
}
