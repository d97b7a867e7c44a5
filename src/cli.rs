use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::auth::Token;
use crate::insights::MetricsSnapshot;
use crate::output;
use crate::providers::github::{
    FetchOptions, GitHubClient, GitHubProvider, RetryPolicy, StateFilter,
};

#[derive(Parser)]
#[command(name = "prlens")]
#[command(author, version, about = "Pull Request Insights Tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GitHubArgs {
    /// GitHub API token
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Repository owner or organization
    #[arg(short, long, env = "GITHUB_OWNER")]
    owner: String,

    /// Repository name
    #[arg(short, long, env = "GITHUB_REPO")]
    repo: String,

    /// GitHub API base URL (GitHub Enterprise: https://host/api/v3)
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    api_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Base delay before retrying a transient failure, doubled per attempt
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch pull requests, compute metrics and write the output files
    Fetch {
        #[command(flatten)]
        github: GitHubArgs,

        /// Pull request state to fetch
        #[arg(short, long, env = "PR_STATE", value_enum, default_value_t = StateFilter::All)]
        state: StateFilter,

        /// Maximum number of pull requests to fetch (newest first)
        #[arg(short, long, env = "PR_LIMIT")]
        limit: Option<usize>,

        /// Label marking a pull request as a data contract change (case-insensitive)
        #[arg(long, env = "DATA_CONTRACT_LABEL", default_value = "data-contract")]
        label: String,

        /// Directory receiving pr_data.csv, metrics.json and last_update.txt
        #[arg(short = 'd', long, env = "PRLENS_OUTPUT_DIR", default_value = "data")]
        output_dir: PathBuf,

        /// Pull requests requested per page
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=100))]
        per_page: u32,
    },
    /// Verify the token and repository access without writing anything
    Check {
        #[command(flatten)]
        github: GitHubArgs,
    },
}

impl GitHubArgs {
    async fn connect(&self) -> crate::error::Result<GitHubProvider> {
        let token = Token::require(self.token.as_deref())?;
        let client = GitHubClient::new(
            &self.api_url,
            token,
            Duration::from_secs(self.timeout_secs),
            RetryPolicy::with_base_delay(Duration::from_millis(self.retry_delay_ms)),
        )?;

        GitHubProvider::connect(client, self.owner.clone(), self.repo.clone()).await
    }
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Fetch {
                github,
                state,
                limit,
                label,
                output_dir,
                per_page,
            } => {
                let repository = format!("{}/{}", github.owner, github.repo);
                info!("Collecting pull request insights for repository: {repository}");

                let provider = github
                    .connect()
                    .await
                    .with_context(|| format!("Failed to connect to {repository}"))?;

                let options = FetchOptions {
                    state: *state,
                    limit: *limit,
                    per_page: *per_page,
                    marker_label: label.clone(),
                };
                let insights = provider
                    .collect_insights(&options)
                    .await
                    .with_context(|| format!("Failed to fetch pull request data for {repository}"))?;

                let paths = output::write_artifacts(output_dir, &insights)
                    .with_context(|| format!("Failed to write output to {}", output_dir.display()))?;
                info!(
                    "Insights for {} written to: {}",
                    insights.repository,
                    output_dir.display()
                );
                info!("Run marker: {}", paths.last_update.display());

                print_summary(&insights.snapshot);
                Ok(())
            }
            Commands::Check { github } => {
                let repository = format!("{}/{}", github.owner, github.repo);
                let provider = github
                    .connect()
                    .await
                    .with_context(|| format!("Failed to connect to {repository}"))?;

                let details = &provider.repository;
                println!("Connected to: {}", provider.full_name());
                println!(
                    "   Description: {}",
                    details.description.as_deref().unwrap_or("-")
                );
                println!("   Stars: {}", details.stargazers_count.unwrap_or(0));
                println!("   Open issues: {}", details.open_issues_count.unwrap_or(0));
                if let Some(branch) = &details.default_branch {
                    println!("   Default branch: {branch}");
                }
                println!("   Private: {}", details.private.unwrap_or(false));

                let latest = provider
                    .latest_pull_request()
                    .await
                    .context("Failed to read the latest pull request")?;
                match latest {
                    Some(pr) => {
                        println!("\nLatest PR:");
                        println!("   #{}: {}", pr.number, pr.title);
                        println!("   Author: {}", pr.author);
                        println!("   State: {}", pr.state.as_str());
                    }
                    None => println!("\nNo pull requests yet."),
                }

                println!("\nAll checks passed. Ready to fetch data.");
                Ok(())
            }
        }
    }
}

fn print_summary(snapshot: &MetricsSnapshot) {
    println!("\n=== PR Analytics Summary ===");
    println!("Total PRs: {}", snapshot.total_prs);
    println!("Merge Rate: {:.1}%", snapshot.merge_rate);
    println!("Avg Merge Time: {:.1} hours", snapshot.avg_merge_time_hours);
    println!("Active Authors: {}", snapshot.active_authors);
    println!("Review Coverage: {:.1}%", snapshot.review_coverage);
    println!("Data Contract PRs: {}", snapshot.data_contract_prs);
    println!("============================\n");
}
