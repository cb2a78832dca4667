//! Pure ranking rules for the monthly best-catch board.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{MonthKey, ReportCandidate, TrophyEntry};

/// Best catch first: heavier fish, then more likes, then the newer report.
///
/// A report without a weight sorts after every weighed report. Report id
/// settles anything left so the order is total.
pub fn compare(a: &ReportCandidate, b: &ReportCandidate) -> Ordering {
    let by_weight = match (a.fish_weight, b.fish_weight) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_weight
        .then_with(|| b.likes_count.cmp(&a.likes_count))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

fn entry_for(month: MonthKey, position: i32, report: ReportCandidate) -> TrophyEntry {
    TrophyEntry {
        month,
        position,
        fish_type: report
            .fish_species
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        fisherman_name: report.fisherman_name,
        location: report.location,
        image_url: report.image_url,
        weight: report.fish_weight,
        date: report.created_at,
        report_id: Some(report.id),
        manual: false,
    }
}

/// Build the automatic entries of `month`.
///
/// Positions held by `pinned` entries are skipped, as are the reports they
/// point at. Positions run from 1 to `top_n`.
pub fn rank(
    month: MonthKey,
    candidates: Vec<ReportCandidate>,
    pinned: &[TrophyEntry],
    top_n: usize,
) -> Vec<TrophyEntry> {
    let taken: HashSet<i32> = pinned.iter().map(|e| e.position).collect();
    let pinned_reports: HashSet<i64> = pinned.iter().filter_map(|e| e.report_id).collect();

    let mut eligible: Vec<ReportCandidate> = candidates
        .into_iter()
        .filter(|r| r.is_trophy_eligible() && month.contains(r.created_at))
        .filter(|r| !pinned_reports.contains(&r.id))
        .collect();
    eligible.sort_by(compare);

    let free = (1..=top_n as i32).filter(|p| !taken.contains(p));
    free.zip(eligible)
        .map(|(position, report)| entry_for(month, position, report))
        .collect()
}
