use log::info;

use crate::error::{PrLensError, Result};
use crate::providers::github::client::{GitHubClient, GitHubRepositoryDto};

pub struct GitHubProvider {
    pub client: GitHubClient,
    pub owner: String,
    pub repo: String,
    pub repository: GitHubRepositoryDto,
}

impl GitHubProvider {
    /// Resolve the repository before handing out a provider, so a bad token or
    /// a missing repository fails here rather than halfway through a run.
    pub async fn connect(client: GitHubClient, owner: String, repo: String) -> Result<Self> {
        if owner.trim().is_empty() || repo.trim().is_empty() {
            return Err(PrLensError::Config(
                "GITHUB_OWNER and GITHUB_REPO must both be set".to_string(),
            ));
        }

        let repository = client.fetch_repository(&owner, &repo).await?;
        info!("Successfully connected to {}", repository.full_name);

        Ok(Self {
            client,
            owner,
            repo,
            repository,
        })
    }

    pub fn full_name(&self) -> &str {
        &self.repository.full_name
    }
}
