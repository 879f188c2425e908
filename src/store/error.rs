//! Store error types
//!
//! Defines the errors a finder backend can raise and how the store reports
//! total backend failure.

use thiserror::Error;

/// Errors that can occur while resolving or fetching metrics
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend could not be reached or timed out
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Requested path does not exist in this backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Remote request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned data we could not interpret
    #[error("Decode error: {0}")]
    Decode(String),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

impl StoreError {
    /// Whether the error means "this backend has nothing" rather than failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::BackendUnavailable("csv".to_string());
        assert_eq!(err.to_string(), "Backend unavailable: csv");

        let err = StoreError::NotFound("a.b".to_string());
        assert_eq!(err.to_string(), "Not found: a.b");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
        assert!(!store_err.is_not_found());
    }
}
