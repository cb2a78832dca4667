use std::time::Duration;

use chrono::{DateTime, Utc};

use super::engine::{ResetTrigger, TrophyEngine};
use crate::models::MonthKey;

/// Slack after midnight so reports stamped at the boundary are in.
const AFTER_MONTH_START: Duration = Duration::from_secs(30);

pub fn until_next_month(now: DateTime<Utc>) -> Duration {
    let next = MonthKey::containing(now).next().start();
    (next - now).to_std().unwrap_or(Duration::ZERO) + AFTER_MONTH_START
}

/// Run the monthly reset at the start of every month, forever.
pub async fn run_monthly_reset(engine: TrophyEngine) {
    loop {
        let wait = until_next_month(engine.now());
        tracing::info!(
            "Next monthly trophy reset in {}h{:02}m",
            wait.as_secs() / 3600,
            wait.as_secs() % 3600 / 60
        );
        tokio::time::sleep(wait).await;

        match engine.monthly_reset("cron", ResetTrigger::Cron).await {
            Ok(outcome) => tracing::info!(
                "Scheduled trophy reset done: {} archived for {}, {} entries for {}",
                outcome.archived_count,
                outcome.archived_month,
                outcome.new_count,
                outcome.month
            ),
            Err(e) => tracing::error!("Scheduled trophy reset failed: {}", e),
        }
    }
}
