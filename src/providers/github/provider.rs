mod core;
mod pulls;

pub use self::core::GitHubProvider;
