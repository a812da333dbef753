use thiserror::Error;

pub type SeasonId = i32;
pub type RoundIndex = i32;
pub type ClanId = i32;

/// Errors surfaced by the ranking engine and its collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArenaError {
    /// The ranking exists but its status flag is not DONE yet
    #[error("Ranking not ready: {key} is {status}")]
    NotReady { key: String, status: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ranked: {0}")]
    NotRanked(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid status transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ArenaError {
    /// Whether the caller may retry the same call later and expect success
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArenaError::NotReady { .. } | ArenaError::StoreUnavailable(_)
        )
    }
}
