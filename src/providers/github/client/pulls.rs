use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::LINK;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use url::Url;

use super::core::{ApiResponse, GitHubClient};
use crate::error::{PrLensError, Result};
use crate::providers::github::types::StateFilter;

#[derive(Debug, Deserialize)]
pub struct GitHubRepositoryDto {
    pub full_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub stargazers_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub open_issues_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub default_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubUserDto {
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubLabelDto {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// One entry of the pull request list endpoint.
#[derive(Debug, Deserialize)]
pub struct GitHubPullDto {
    pub number: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<GitHubUserDto>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub labels: Option<Vec<GitHubLabelDto>>,
    #[serde(default, deserialize_with = "lenient")]
    pub requested_reviewers: Option<Vec<GitHubUserDto>>,
    #[serde(default, deserialize_with = "lenient")]
    pub html_url: Option<String>,
}

/// Counters only served by the single pull request endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct GitHubPullDetailsDto {
    #[serde(default, deserialize_with = "lenient")]
    pub merged: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub review_comments: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub additions: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub deletions: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub changed_files: Option<u64>,
}

#[derive(Debug)]
pub struct PullPage {
    pub items: Vec<GitHubPullDto>,
    /// Entries the API returned, including the skipped ones.
    pub returned: usize,
    pub next: Option<Url>,
}

/// Optional fields that fail to parse become `None` instead of failing the item.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }

    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!("Malformed field value {value} ignored: {e}");
            Ok(None)
        }
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }

        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

fn error_body(response: &ApiResponse) -> String {
    format!("{} - {}", response.status, response.text().trim())
}

impl GitHubClient {
    /// Resolve the repository, mapping access problems to domain errors
    pub async fn fetch_repository(&self, owner: &str, repo: &str) -> Result<GitHubRepositoryDto> {
        let url = self.repo_url(owner, repo, &[])?;
        let response = self.get(url).await?;

        match response.status {
            status if status.is_success() => response.json::<GitHubRepositoryDto>(),
            StatusCode::UNAUTHORIZED => Err(PrLensError::Config(
                "GitHub rejected the token (401 Unauthorized); check GITHUB_TOKEN".to_string(),
            )),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                Err(PrLensError::RepositoryNotFound(format!("{owner}/{repo}")))
            }
            _ => Err(PrLensError::Api(format!(
                "Failed to resolve repository {owner}/{repo}: {}",
                error_body(&response)
            ))),
        }
    }

    /// First page of the pull request listing, newest first
    pub fn pulls_url(
        &self,
        owner: &str,
        repo: &str,
        state: StateFilter,
        per_page: u32,
    ) -> Result<Url> {
        let mut url = self.repo_url(owner, repo, &["pulls"])?;
        url.query_pairs_mut()
            .append_pair("state", state.as_str())
            .append_pair("sort", "created")
            .append_pair("direction", "desc")
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", "1");
        Ok(url)
    }

    /// Fetch one page of the listing; entries that cannot be read are skipped
    pub async fn fetch_pull_page(&self, url: Url) -> Result<PullPage> {
        let response = self.get(url).await?;
        if !response.status.is_success() {
            return Err(PrLensError::Api(format!(
                "Failed to fetch pull requests: {}",
                error_body(&response)
            )));
        }

        let next = response
            .headers
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_link);

        let values = response.json::<Vec<serde_json::Value>>()?;
        let returned = values.len();
        let items = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<GitHubPullDto>(value) {
                Ok(pull) => Some(pull),
                Err(e) => {
                    warn!("Skipping malformed pull request entry: {e}");
                    None
                }
            })
            .collect();

        Ok(PullPage {
            items,
            returned,
            next,
        })
    }

    /// Fetch the counters of a single pull request.
    ///
    /// Returns `None` when the pull request vanished between listing and lookup.
    pub async fn fetch_pull_details(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<GitHubPullDetailsDto>> {
        let url = self.repo_url(owner, repo, &["pulls", &number.to_string()])?;
        let response = self.get(url).await?;

        match response.status {
            status if status.is_success() => Ok(Some(response.json::<GitHubPullDetailsDto>()?)),
            StatusCode::NOT_FOUND => {
                debug!("Pull request #{number} disappeared before its details were read");
                Ok(None)
            }
            _ => Err(PrLensError::Api(format!(
                "Failed to fetch pull request #{number}: {}",
                error_body(&response)
            ))),
        }
    }
}
