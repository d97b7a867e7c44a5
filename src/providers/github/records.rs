use chrono::{DateTime, Utc};
use log::warn;

use super::client::{GitHubPullDetailsDto, GitHubPullDto};
use crate::insights::{PullRequestRecord, PullRequestState};

const UNKNOWN_AUTHOR: &str = "unknown";

/// Turn a listed pull request and its optional detail counters into a record.
///
/// Never fails: anything missing falls back to its documented default.
pub fn normalize(
    pull: GitHubPullDto,
    details: Option<GitHubPullDetailsDto>,
    marker_label: &str,
) -> PullRequestRecord {
    let details = details.unwrap_or_default();
    let number = pull.number;

    let is_merged = details.merged.unwrap_or(false) || pull.merged_at.is_some();
    let merge_time_hours = merge_time_hours(number, is_merged, pull.created_at, pull.merged_at);

    let labels: Vec<String> = pull
        .labels
        .unwrap_or_default()
        .into_iter()
        .filter_map(|label| label.name)
        .collect();
    let has_data_contract_label = has_marker_label(&labels, marker_label);

    let reviewers = pull
        .requested_reviewers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|reviewer| reviewer.login)
        .collect();

    let author = pull
        .user
        .and_then(|user| user.login)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    PullRequestRecord {
        number,
        title: pull.title.unwrap_or_default(),
        state: parse_state(number, pull.state.as_deref(), pull.closed_at.is_some()),
        author,
        created_at: pull.created_at,
        updated_at: pull.updated_at,
        closed_at: pull.closed_at,
        merged_at: pull.merged_at,
        is_merged,
        merge_time_hours,
        labels,
        has_data_contract_label,
        reviewers,
        review_comments: details.review_comments.unwrap_or(0),
        commits: details.commits.unwrap_or(0),
        additions: details.additions.unwrap_or(0),
        deletions: details.deletions.unwrap_or(0),
        changed_files: details.changed_files.unwrap_or(0),
        url: pull.html_url.unwrap_or_default(),
    }
}

/// Hours between creation and merge; a merge stamped before creation counts as 0.
pub fn merge_time_hours(
    number: u64,
    is_merged: bool,
    created_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
) -> Option<f64> {
    if !is_merged {
        return None;
    }
    let (created_at, merged_at) = (created_at?, merged_at?);

    #[allow(clippy::cast_precision_loss)]
    let hours = (merged_at - created_at).num_milliseconds() as f64 / 3_600_000.0;
    if hours < 0.0 {
        warn!("Pull request #{number} was merged before it was created; merge time set to 0");
        return Some(0.0);
    }

    Some(hours)
}

pub fn has_marker_label(labels: &[String], marker_label: &str) -> bool {
    let marker = marker_label.to_lowercase();
    labels.iter().any(|label| label.to_lowercase() == marker)
}

fn parse_state(number: u64, state: Option<&str>, has_closed_at: bool) -> PullRequestState {
    match state {
        Some("open") => PullRequestState::Open,
        Some("closed") => PullRequestState::Closed,
        other => {
            let fallback = if has_closed_at {
                PullRequestState::Closed
            } else {
                PullRequestState::Open
            };
            warn!(
                "Pull request #{number} has unexpected state {other:?}; using '{}'",
                fallback.as_str()
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i64::from(hour))
    }

    fn pull(json: &str) -> GitHubPullDto {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_merge_time_for_merged_pull_request() {
        assert_eq!(merge_time_hours(1, true, Some(at(0)), Some(at(30))), Some(30.0));
    }

    #[test]
    fn test_merge_time_keeps_fractional_hours() {
        let created = at(0);
        let merged = created + chrono::Duration::minutes(90);

        assert_eq!(merge_time_hours(1, true, Some(created), Some(merged)), Some(1.5));
    }

    #[test]
    fn test_merge_time_requires_merge_and_both_timestamps() {
        assert_eq!(merge_time_hours(1, false, Some(at(0)), Some(at(5))), None);
        assert_eq!(merge_time_hours(1, true, None, Some(at(5))), None);
        assert_eq!(merge_time_hours(1, true, Some(at(0)), None), None);
    }

    #[test]
    fn test_merge_before_creation_is_clamped() {
        assert_eq!(merge_time_hours(1, true, Some(at(10)), Some(at(2))), Some(0.0));
    }

    #[test]
    fn test_marker_label_is_case_insensitive() {
        let labels = vec!["bug".to_string(), "Data-Contract".to_string()];

        assert!(has_marker_label(&labels, "data-contract"));
        assert!(has_marker_label(&labels, "DATA-CONTRACT"));
    }

    #[test]
    fn test_marker_label_requires_exact_match() {
        let labels = vec!["data contract".to_string(), "data-contracts".to_string()];

        assert!(!has_marker_label(&labels, "data-contract"));
        assert!(!has_marker_label(&[], "data-contract"));
    }

    #[test]
    fn test_normalize_full_pull_request() {
        let listed = pull(
            r#"{
                "number": 42,
                "title": "Add orders schema",
                "state": "closed",
                "user": {"login": "alice"},
                "created_at": "2024-03-01T00:00:00Z",
                "updated_at": "2024-03-02T00:00:00Z",
                "closed_at": "2024-03-01T06:00:00Z",
                "merged_at": "2024-03-01T06:00:00Z",
                "labels": [{"name": "Data-Contract"}, {"name": "schema"}],
                "requested_reviewers": [{"login": "bob"}, {"login": "carol"}],
                "html_url": "https://github.com/octo/app/pull/42"
            }"#,
        );
        let details = GitHubPullDetailsDto {
            merged: Some(true),
            review_comments: Some(3),
            commits: Some(2),
            additions: Some(120),
            deletions: Some(4),
            changed_files: Some(5),
        };

        let record = normalize(listed, Some(details), "data-contract");

        assert_eq!(record.number, 42);
        assert_eq!(record.state, PullRequestState::Closed);
        assert_eq!(record.author, "alice");
        assert!(record.is_merged);
        assert_eq!(record.merge_time_hours, Some(6.0));
        assert_eq!(record.labels, vec!["Data-Contract", "schema"]);
        assert!(record.has_data_contract_label);
        assert_eq!(record.reviewers, vec!["bob", "carol"]);
        assert_eq!(record.review_comments, 3);
        assert_eq!(record.additions, 120);
        assert_eq!(record.url, "https://github.com/octo/app/pull/42");
    }

    #[test]
    fn test_normalize_sparse_pull_request() {
        let record = normalize(pull(r#"{"number": 7, "state": "open"}"#), None, "data-contract");

        assert_eq!(record.author, "unknown");
        assert_eq!(record.title, "");
        assert_eq!(record.state, PullRequestState::Open);
        assert!(!record.is_merged);
        assert_eq!(record.merge_time_hours, None);
        assert!(record.labels.is_empty());
        assert!(!record.has_data_contract_label);
        assert_eq!(record.commits, 0);
    }

    #[test]
    fn test_normalize_unknown_state_uses_closed_at() {
        let record = normalize(
            pull(r#"{"number": 8, "state": "draft", "closed_at": "2024-03-01T00:00:00Z"}"#),
            None,
            "data-contract",
        );

        assert_eq!(record.state, PullRequestState::Closed);
    }

    #[test]
    fn test_normalize_merged_without_created_at() {
        let record = normalize(
            pull(r#"{"number": 5, "state": "closed", "merged_at": "2024-03-01T00:00:00Z"}"#),
            None,
            "data-contract",
        );

        assert!(record.is_merged);
        assert_eq!(record.merge_time_hours, None);
    }
}
