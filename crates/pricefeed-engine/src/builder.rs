//! Builder pattern for the price broker.

use std::sync::Arc;

use tokio::runtime::Handle;

use pricefeed_traits::{PriceCache, PriceFetcher};

use crate::broker::PriceUpdateBroker;
use crate::cache::InMemoryPriceCache;
use crate::config::BrokerConfig;
use crate::error::BrokerError;

/// Builder for constructing a [`PriceUpdateBroker`].
pub struct BrokerBuilder {
    config: Option<BrokerConfig>,
    fetcher: Option<Arc<dyn PriceFetcher>>,
    cache: Option<Arc<dyn PriceCache>>,
    runtime: Option<Handle>,
}

impl BrokerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            fetcher: None,
            cache: None,
            runtime: None,
        }
    }

    /// Set the broker configuration.
    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the price fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PriceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Set the price cache. Defaults to an [`InMemoryPriceCache`].
    pub fn with_cache(mut self, cache: Arc<dyn PriceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run pollers on `runtime` instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the broker.
    pub fn build(self) -> Result<PriceUpdateBroker, BrokerError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let fetcher = self
            .fetcher
            .ok_or_else(|| BrokerError::Config("fetcher not configured".into()))?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryPriceCache::new(config.stale_threshold())));

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BrokerError::NoRuntime)?,
        };

        PriceUpdateBroker::with_runtime(config, fetcher, cache, runtime)
    }
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
