use futures::{stream, StreamExt, TryStreamExt};
use log::{info, warn};

use super::core::GitHubProvider;
use crate::error::Result;
use crate::insights::{PullRequestInsights, PullRequestRecord};
use crate::providers::github::metrics::calculate_snapshot;
use crate::providers::github::records::normalize;
use crate::providers::github::types::{FetchOptions, StateFilter};

const DETAIL_CONCURRENCY: usize = 4;
const PROGRESS_INTERVAL: usize = 10;

impl GitHubProvider {
    /// Page through the listing newest first until it runs out or `limit` is hit.
    pub async fn fetch_pull_requests(&self, options: &FetchOptions) -> Result<Vec<PullRequestRecord>> {
        match options.limit {
            Some(limit) => info!("Fetching up to {limit} {} pull requests...", options.state.as_str()),
            None => info!("Fetching all {} pull requests...", options.state.as_str()),
        }

        let mut records = Vec::new();
        let mut next = Some(self.client.pulls_url(
            &self.owner,
            &self.repo,
            options.state,
            options.per_page,
        )?);
        let mut page = 0;

        while let Some(url) = next.take() {
            let remaining = options
                .limit
                .map_or(usize::MAX, |limit| limit.saturating_sub(records.len()));
            if remaining == 0 {
                break;
            }

            page += 1;
            let listing = self.client.fetch_pull_page(url).await?;
            if listing.returned == 0 {
                info!("No more pull requests returned by API, stopping");
                break;
            }

            let pulls: Vec<_> = listing.items.into_iter().take(remaining).collect();

            // Details arrive in list order; `buffered` keeps it.
            let details: Vec<_> = stream::iter(pulls.iter().map(|pull| pull.number))
                .map(|number| self.client.fetch_pull_details(&self.owner, &self.repo, number))
                .buffered(DETAIL_CONCURRENCY)
                .try_collect()
                .await?;

            let fetched_count = pulls.len();
            for (pull, detail) in pulls.into_iter().zip(details) {
                if detail.is_none() {
                    warn!("Pull request #{} has no details; counters default to 0", pull.number);
                }
                records.push(normalize(pull, detail, &options.marker_label));

                if records.len() % PROGRESS_INTERVAL == 0 {
                    info!("Processed {} PRs...", records.len());
                }
            }

            info!(
                "Page {page}: fetched {fetched_count} pull requests (total: {})",
                records.len()
            );

            next = listing.next;
        }

        info!("Successfully fetched {} pull requests", records.len());
        Ok(records)
    }

    /// Newest pull request in any state, if the repository has one.
    pub async fn latest_pull_request(&self) -> Result<Option<PullRequestRecord>> {
        let options = FetchOptions {
            state: StateFilter::All,
            limit: Some(1),
            per_page: 1,
            ..FetchOptions::default()
        };

        Ok(self.fetch_pull_requests(&options).await?.into_iter().next())
    }

    pub async fn collect_insights(&self, options: &FetchOptions) -> Result<PullRequestInsights> {
        info!("Starting insights collection for repository: {}", self.full_name());

        let records = self.fetch_pull_requests(options).await?;

        if records.is_empty() {
            warn!("No pull requests found for repository: {}", self.full_name());
        }

        let snapshot = calculate_snapshot(&records);

        Ok(PullRequestInsights {
            repository: self.full_name().to_string(),
            records,
            snapshot,
        })
    }
}
