use clap::ValueEnum;

/// Which pull requests the listing endpoint should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StateFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StateFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub state: StateFilter,
    pub limit: Option<usize>,
    pub per_page: u32,
    /// Label that classifies a pull request as touching a data contract
    pub marker_label: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            state: StateFilter::All,
            limit: None,
            per_page: 100,
            marker_label: "data-contract".to_string(),
        }
    }
}
