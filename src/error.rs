use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrLensError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Repository '{0}' does not exist or is not accessible with the given token")]
    RepositoryNotFound(String),

    #[error("GitHub API rate limit exhausted (quota resets at {reset_at})")]
    RateLimitExceeded { reset_at: String },

    #[error("Request to {url} kept failing after {attempts} attempts: {reason}")]
    TransientFetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PrLensError>;
