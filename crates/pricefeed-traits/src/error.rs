//! Error types for collaborator operations.

use thiserror::Error;

/// Error reported by a price source or cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Connection to the price provider failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out
    #[error("timeout")]
    Timeout,

    /// Malformed response or file contents
    #[error("parse error: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Rate limited by the provider
    #[error("rate limited")]
    RateLimited,

    /// The provider does not quote prices in this currency
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SourceError {
    /// Returns true if retrying the same request can never succeed.
    ///
    /// Everything except an unsupported currency is treated as transient.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::UnsupportedCurrency(_))
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::IoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsupported_currency_is_fatal() {
        assert!(SourceError::UnsupportedCurrency("XYZ".into()).is_fatal());
        assert!(!SourceError::Timeout.is_fatal());
        assert!(!SourceError::RateLimited.is_fatal());
        assert!(!SourceError::ConnectionFailed("reset".into()).is_fatal());
        assert!(!SourceError::ParseError("bad json".into()).is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SourceError = io.into();
        assert!(matches!(err, SourceError::IoError(_)));
        assert!(!err.is_fatal());
    }
}
