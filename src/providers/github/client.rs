mod core;
mod pulls;
mod retry;

pub use self::core::GitHubClient;
pub use pulls::{GitHubPullDetailsDto, GitHubPullDto, GitHubRepositoryDto};
pub use retry::RetryPolicy;
