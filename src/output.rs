//! Persists a run's artifacts.
//!
//! All three files are staged as temporary files inside the output directory
//! and only renamed into place once every one of them was written. A failure
//! anywhere before the renames leaves the previous artifacts untouched, and
//! the dropped temporary files remove themselves.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PrLensError, Result};
use crate::insights::{MetricsSnapshot, PullRequestInsights, PullRequestRecord};

pub const PR_DATA_FILE: &str = "pr_data.csv";
pub const METRICS_FILE: &str = "metrics.json";
pub const LAST_UPDATE_FILE: &str = "last_update.txt";

const LIST_DELIMITER: &str = ";";

const CSV_HEADER: [&str; 19] = [
    "number",
    "title",
    "state",
    "author",
    "created_at",
    "updated_at",
    "closed_at",
    "merged_at",
    "is_merged",
    "merge_time_hours",
    "labels",
    "has_data_contract_label",
    "reviewers",
    "review_comments",
    "commits",
    "additions",
    "deletions",
    "changed_files",
    "url",
];

#[derive(Debug)]
pub struct ArtifactPaths {
    pub records: PathBuf,
    pub metrics: PathBuf,
    pub last_update: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            records: dir.join(PR_DATA_FILE),
            metrics: dir.join(METRICS_FILE),
            last_update: dir.join(LAST_UPDATE_FILE),
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    number: u64,
    title: &'a str,
    state: &'static str,
    author: &'a str,
    created_at: Option<String>,
    updated_at: Option<String>,
    closed_at: Option<String>,
    merged_at: Option<String>,
    is_merged: bool,
    merge_time_hours: Option<f64>,
    labels: String,
    has_data_contract_label: bool,
    reviewers: String,
    review_comments: u64,
    commits: u64,
    additions: u64,
    deletions: u64,
    changed_files: u64,
    url: &'a str,
}

impl<'a> From<&'a PullRequestRecord> for CsvRow<'a> {
    fn from(record: &'a PullRequestRecord) -> Self {
        Self {
            number: record.number,
            title: &record.title,
            state: record.state.as_str(),
            author: &record.author,
            created_at: record.created_at.map(format_timestamp),
            updated_at: record.updated_at.map(format_timestamp),
            closed_at: record.closed_at.map(format_timestamp),
            merged_at: record.merged_at.map(format_timestamp),
            is_merged: record.is_merged,
            merge_time_hours: record.merge_time_hours,
            labels: record.labels.join(LIST_DELIMITER),
            has_data_contract_label: record.has_data_contract_label,
            reviewers: record.reviewers.join(LIST_DELIMITER),
            review_comments: record.review_comments,
            commits: record.commits,
            additions: record.additions,
            deletions: record.deletions,
            changed_files: record.changed_files,
            url: &record.url,
        }
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn render_records_csv(records: &[PullRequestRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer
        .into_inner()
        .map_err(|e| PrLensError::Io(e.into_error()))
}

pub fn render_snapshot_json(snapshot: &MetricsSnapshot) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec_pretty(snapshot)?;
    json.push(b'\n');
    Ok(json)
}

/// Mode the committed artifact should carry: the replaced file's, or 0644 for
/// a new one. Temporary files start out owner-only.
fn artifact_permissions(target: &Path) -> Option<fs::Permissions> {
    match fs::metadata(target) {
        Ok(metadata) if metadata.is_file() => Some(metadata.permissions()),
        _ => default_permissions(),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

fn stage(dir: &Path, target: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    if let Some(permissions) = artifact_permissions(target) {
        file.as_file().set_permissions(permissions)?;
    }
    file.as_file().sync_all()?;
    debug!("Staged {} bytes at {}", contents.len(), file.path().display());
    Ok(file)
}

/// Write the record table, the snapshot and the run marker as one commit.
pub fn write_artifacts(dir: &Path, insights: &PullRequestInsights) -> Result<ArtifactPaths> {
    fs::create_dir_all(dir)?;
    let paths = ArtifactPaths::in_dir(dir);

    let records = stage(dir, &paths.records, &render_records_csv(&insights.records)?)?;
    let metrics = stage(dir, &paths.metrics, &render_snapshot_json(&insights.snapshot)?)?;
    let marker = stage(
        dir,
        &paths.last_update,
        format_timestamp(insights.snapshot.last_updated).as_bytes(),
    )?;

    // The marker goes last: a run is only complete once it moved.
    let mut committed: Vec<&Path> = Vec::new();
    for (staged, target) in [
        (records, &paths.records),
        (metrics, &paths.metrics),
        (marker, &paths.last_update),
    ] {
        if let Err(e) = staged.persist(target) {
            if !committed.is_empty() {
                let replaced: Vec<_> = committed
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect();
                warn!(
                    "Output is partially committed: replaced {} but not {}; {} still marks the previous run",
                    replaced.join(", "),
                    target.display(),
                    paths.last_update.display()
                );
            }
            return Err(PrLensError::Io(e.error));
        }
        committed.push(target.as_path());
    }

    info!(
        "Saved {} PRs to {} and metrics to {}",
        insights.records.len(),
        paths.records.display(),
        paths.metrics.display()
    );

    Ok(paths)
}
