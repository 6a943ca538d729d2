//! Broker configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pricefeed_traits::CurrencyCode;

use crate::error::BrokerError;

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Seconds between scheduled polls of one currency
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single fetch, in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Currencies accepted at subscribe time (None = all)
    #[serde(default)]
    pub supported_currencies: Option<Vec<String>>,

    /// Seed new subscriptions with cached prices
    #[serde(default)]
    pub replay_cached: bool,

    /// Age after which a cached price counts as stale
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    180
}

fn default_fetch_timeout_ms() -> u64 {
    15_000
}

fn default_stale_threshold_secs() -> u64 {
    600
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            supported_currencies: None,
            replay_cached: false,
            stale_threshold_secs: default_stale_threshold_secs(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BrokerError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BrokerError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, BrokerError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that intervals are usable.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.poll_interval_secs == 0 {
            return Err(BrokerError::Config(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(BrokerError::Config(
                "fetch_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Sets the poll interval.
    ///
    /// The interval has whole-second granularity; a fractional second rounds up.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let extra = u64::from(interval.subsec_nanos() > 0);
        self.poll_interval_secs = interval.as_secs().saturating_add(extra);
        self
    }

    /// Sets the fetch timeout.
    ///
    /// The timeout has millisecond granularity; a fractional millisecond rounds up.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        let extra = u64::from(timeout.subsec_nanos() % 1_000_000 > 0);
        self.fetch_timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_add(extra);
        self
    }

    /// Restricts subscriptions to the given currencies.
    pub fn with_supported_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_currencies = Some(currencies.into_iter().map(Into::into).collect());
        self
    }

    /// Enables replay of cached prices to new subscriptions.
    pub fn with_replay_cached(mut self, replay: bool) -> Self {
        self.replay_cached = replay;
        self
    }

    /// Scheduled poll cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Staleness window for cached prices.
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    /// Whether `currency` passes the allow-list.
    pub fn allows_currency(&self, currency: &CurrencyCode) -> bool {
        match &self.supported_currencies {
            Some(list) => list.iter().any(|c| c == currency.as_str()),
            None => true,
        }
    }
}
