mod auth;
mod cli;
mod error;
mod insights;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting PRLens - Pull Request Insights Tool");
    cli.execute().await?;

    Ok(())
}
