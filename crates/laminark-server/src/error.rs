// crates/laminark-server/src/error.rs
// Standardized error types for Laminark

use thiserror::Error;

/// Main error type for the Laminark library
#[derive(Error, Debug)]
pub enum LaminarkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("project not set")]
    ProjectNotSet,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using LaminarkError
pub type Result<T> = std::result::Result<T, LaminarkError>;

impl LaminarkError {
    /// Convert to user-facing string for MCP tool boundaries
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for LaminarkError {
    fn from(s: String) -> Self {
        LaminarkError::Other(s)
    }
}

impl From<tokio::task::JoinError> for LaminarkError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            LaminarkError::Cancelled
        } else {
            LaminarkError::Other(err.to_string())
        }
    }
}

impl From<LaminarkError> for String {
    fn from(err: LaminarkError) -> Self {
        err.to_string()
    }
}
