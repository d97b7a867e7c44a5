use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State as reported by the hosting API, independent of merge status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

impl PullRequestState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// One normalized pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub state: PullRequestState,
    pub author: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub is_merged: bool,
    pub merge_time_hours: Option<f64>,
    pub labels: Vec<String>,
    pub has_data_contract_label: bool,
    pub reviewers: Vec<String>,
    pub review_comments: u64,
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub url: String,
}

/// Aggregate metrics over one run's record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_prs: usize,
    pub merged_prs: usize,
    pub merge_rate: f64,
    pub avg_merge_time_hours: f64,
    pub fast_merge_rate: f64,
    pub active_authors: usize,
    pub review_coverage: f64,
    pub data_contract_prs: usize,
    pub last_updated: DateTime<Utc>,
}

/// Everything a `fetch` run produces before it is persisted.
#[derive(Debug)]
pub struct PullRequestInsights {
    pub repository: String,
    pub records: Vec<PullRequestRecord>,
    pub snapshot: MetricsSnapshot,
}
