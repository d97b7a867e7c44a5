use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::insights::{MetricsSnapshot, PullRequestRecord};

const FAST_MERGE_HOURS: f64 = 24.0;

pub fn calculate_snapshot(records: &[PullRequestRecord]) -> MetricsSnapshot {
    calculate_snapshot_at(records, Utc::now())
}

/// Snapshot with an explicit computation time; everything else is a pure fold.
pub fn calculate_snapshot_at(
    records: &[PullRequestRecord],
    last_updated: DateTime<Utc>,
) -> MetricsSnapshot {
    let total_prs = records.len();
    let merged_prs = records.iter().filter(|r| r.is_merged).count();

    let merge_times: Vec<f64> = records
        .iter()
        .filter(|r| r.is_merged)
        .filter_map(|r| r.merge_time_hours)
        .map(|hours| hours.max(0.0))
        .collect();
    let fast_merges = merge_times
        .iter()
        .filter(|&&hours| hours < FAST_MERGE_HOURS)
        .count();

    let active_authors = records
        .iter()
        .map(|r| r.author.as_str())
        .collect::<HashSet<_>>()
        .len();

    let reviewed = records.iter().filter(|r| r.review_comments > 0).count();
    let data_contract_prs = records.iter().filter(|r| r.has_data_contract_label).count();

    MetricsSnapshot {
        total_prs,
        merged_prs,
        merge_rate: round_one_decimal(percentage(merged_prs, total_prs)),
        avg_merge_time_hours: round_one_decimal(mean(&merge_times)),
        fast_merge_rate: round_one_decimal(percentage(fast_merges, merge_times.len())),
        active_authors,
        review_coverage: round_one_decimal(percentage(reviewed, total_prs)),
        data_contract_prs,
        last_updated,
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let rate = (part as f64 / total as f64) * 100.0;
    rate
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
