//! Query error types
//!
//! Defines all error conditions that can occur while expanding, parsing and
//! evaluating target expressions.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during query operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Target expression could not be parsed
    #[error("Invalid expression at position {position}: '{fragment}'")]
    InvalidExpression { fragment: String, position: usize },

    /// Function name is not registered
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Arguments do not fit the function's signature
    #[error("Invalid arguments to {function}: {message}")]
    InvalidArguments { function: String, message: String },

    /// Template placeholder has no binding
    #[error("Undefined template argument: ${0}")]
    UndefinedTemplateArg(String),

    /// Resolved window is empty or inverted
    #[error("Invalid empty time range")]
    InvalidTimeRange,

    /// Time expression could not be parsed
    #[error("Invalid time for {field}: '{value}'")]
    InvalidTime { field: String, value: String },

    /// Timezone name is not in the database
    #[error("Unknown timezone: '{0}'.")]
    UnknownTimezone(String),

    /// Every finder failed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Request deadline elapsed
    #[error("Render timed out after {0} ms")]
    RenderTimeout(u64),
}

impl QueryError {
    /// Shorthand for [`QueryError::InvalidArguments`]
    pub fn invalid_args(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Whether the error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::BackendUnavailable(_) | Self::RenderTimeout(_))
    }
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidPattern(pattern) => Self::InvalidExpression {
                fragment: pattern,
                position: 0,
            },
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: QueryError = StoreError::InvalidPattern("a.[b".to_string()).into();
        assert!(matches!(err, QueryError::InvalidExpression { .. }));
        assert!(err.is_client_error());

        let err: QueryError = StoreError::BackendUnavailable("down".to_string()).into();
        assert!(matches!(err, QueryError::BackendUnavailable(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(QueryError::InvalidTimeRange.to_string(), "Invalid empty time range");
        assert_eq!(
            QueryError::UnknownTimezone("Europe/Lausanne".to_string()).to_string(),
            "Unknown timezone: 'Europe/Lausanne'."
        );
    }
}
