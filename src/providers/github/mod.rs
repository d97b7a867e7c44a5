mod client;
mod metrics;
mod provider;
mod records;
mod types;

pub use client::{GitHubClient, RetryPolicy};
pub use provider::GitHubProvider;
pub use types::{FetchOptions, StateFilter};
