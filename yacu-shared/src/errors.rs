//! Error types used across yacu.

use thiserror::Error;

/// Result type for yacu operations.
pub type YacuResult<T> = Result<T, YacuError>;

#[derive(Debug, Error)]
pub enum YacuError {
    /// Image reference pins a digest and carries no tag. Such containers
    /// have nothing to update and are skipped by the scanner.
    #[error("repository is not tagged: {0}")]
    RepositoryNotTagged(String),

    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Container runtime call failed.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Target container, image or manifest no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("registry authentication failed: {0}")]
    RegistryAuth(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("images error: {0}")]
    Image(String),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl YacuError {
    /// True when the target of a runtime or registry call vanished.
    pub fn is_not_found(&self) -> bool {
        matches!(self, YacuError::NotFound(_))
    }
}

impl From<std::io::Error> for YacuError {
    fn from(err: std::io::Error) -> Self {
        YacuError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for YacuError {
    fn from(err: serde_json::Error) -> Self {
        YacuError::Internal(format!("JSON error: {}", err))
    }
}
