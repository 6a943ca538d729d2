//! Broker error types.

use thiserror::Error;

use pricefeed_traits::{CurrencyCode, SourceError};

/// Broker error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Empty asset set or unsupported currency at subscribe time
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// A single poll failed; the poller keeps running
    #[error("transient fetch error for {currency}: {reason}")]
    TransientFetch {
        /// Currency being polled
        currency: CurrencyCode,
        /// Underlying failure
        reason: String,
    },

    /// The currency can never be polled; every subscription for it is closed
    #[error("fatal error for currency {currency}: {reason}")]
    FatalCurrency {
        /// Affected currency
        currency: CurrencyCode,
        /// Underlying failure
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Built outside a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Shutdown
    #[error("broker is shut down")]
    Shutdown,
}

impl BrokerError {
    /// Classifies a collaborator failure for `currency`.
    pub fn from_source(currency: &CurrencyCode, err: SourceError) -> Self {
        if err.is_fatal() {
            BrokerError::FatalCurrency {
                currency: currency.clone(),
                reason: err.to_string(),
            }
        } else {
            BrokerError::TransientFetch {
                currency: currency.clone(),
                reason: err.to_string(),
            }
        }
    }

    /// Returns true for errors that tear down subscriptions.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::FatalCurrency { .. })
    }
}

impl From<toml::de::Error> for BrokerError {
    fn from(e: toml::de::Error) -> Self {
        BrokerError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        let usd = CurrencyCode::new("USD");

        let transient = BrokerError::from_source(&usd, SourceError::Timeout);
        assert!(matches!(transient, BrokerError::TransientFetch { .. }));
        assert!(!transient.is_fatal());

        let fatal =
            BrokerError::from_source(&usd, SourceError::UnsupportedCurrency("USD".into()));
        assert!(fatal.is_fatal());
        assert_eq!(
            fatal.to_string(),
            "fatal error for currency USD: unsupported currency: USD"
        );
    }
}
