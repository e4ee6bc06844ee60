//! Query error types
//!
//! Errors raised while building a JQL query. All of them are produced
//! synchronously by the call that introduced the bad value.

use thiserror::Error;

/// Errors that can occur while building a query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Malformed builder input (unknown key, wrong type, missing source)
    #[error("JQL syntax error: {0}")]
    Syntax(String),

    /// An expression argument was neither text nor raw code
    #[error("Invalid JavaScript text: {0}")]
    InvalidExpression(String),
}

impl QueryError {
    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    /// The message without the error-kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Syntax(msg) | Self::InvalidExpression(msg) => msg,
        }
    }
}

/// Result type for query building operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::syntax("limit in top must be an integer");
        assert_eq!(
            err.to_string(),
            "JQL syntax error: limit in top must be an integer"
        );
        assert_eq!(err.message(), "limit in top must be an integer");
    }
}
