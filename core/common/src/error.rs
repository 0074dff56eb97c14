//! Common error types for BudgetSync.

use thiserror::Error;

/// Top-level error type for BudgetSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// A remote or local operation did not finish in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote service answered with something we cannot use.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is worth retrying (unreachable network or timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Network("unreachable".to_string()).is_transient());
        assert!(Error::Timeout("upload".to_string()).is_transient());

        assert!(!Error::Transport("malformed payload".to_string()).is_transient());
        assert!(!Error::Storage("disk full".to_string()).is_transient());
        assert!(!Error::Serialization("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_io_error_is_not_transient() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(!err.is_transient());
    }
}
