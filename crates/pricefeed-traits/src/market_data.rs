//! Price data and collaborator traits.
//!
//! These traits define the two interfaces the broker consumes:
//! - [`PriceFetcher`]: One round-trip fetch of current prices for a currency
//! - [`PriceCache`]: Last-known prices per (asset, currency) with a freshness query

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::ids::{AssetId, CurrencyCode};

// =============================================================================
// PRICE POINT
// =============================================================================

/// Price of one asset in one currency at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Asset identifier
    pub asset_id: AssetId,
    /// Currency the price is quoted in
    pub currency: CurrencyCode,
    /// Price value
    pub value: Decimal,
    /// When the price was observed by the provider
    pub timestamp: DateTime<Utc>,
}

impl PricePoint {
    /// Creates a price point stamped with the current time.
    pub fn new(
        asset_id: impl Into<AssetId>,
        currency: impl Into<CurrencyCode>,
        value: Decimal,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            currency: currency.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    /// Sets the observation timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A set of prices for one currency, keyed by asset.
pub type PriceBatch = HashMap<AssetId, PricePoint>;

// =============================================================================
// PRICE FETCHER
// =============================================================================

/// Performs one round-trip fetch of current prices.
///
/// Must be safe to call concurrently for different currencies. The broker
/// never issues two overlapping fetches for the same currency.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Fetch current prices for `asset_ids` quoted in `currency`.
    ///
    /// Assets the provider does not know are simply absent from the batch.
    async fn fetch(
        &self,
        currency: &CurrencyCode,
        asset_ids: &[AssetId],
    ) -> Result<PriceBatch, SourceError>;

    /// Whether this provider can quote prices in `currency` at all.
    fn supports_currency(&self, _currency: &CurrencyCode) -> bool {
        true
    }
}

// =============================================================================
// PRICE CACHE
// =============================================================================

/// Synchronous store of last-known prices.
///
/// Treated as append-mostly shared storage: implementations must tolerate
/// concurrent readers and writers.
pub trait PriceCache: Send + Sync {
    /// Last-known price for one asset.
    fn get(&self, asset_id: &AssetId, currency: &CurrencyCode) -> Option<PricePoint>;

    /// Last-known prices for several assets. Missing assets are omitted.
    fn get_many(&self, asset_ids: &[AssetId], currency: &CurrencyCode) -> PriceBatch {
        asset_ids
            .iter()
            .filter_map(|id| self.get(id, currency).map(|p| (id.clone(), p)))
            .collect()
    }

    /// Store a batch of prices, replacing older entries.
    fn put(&self, batch: &PriceBatch);

    /// Timestamp of the oldest cached entry among `asset_ids`.
    ///
    /// Returns `None` when none of the assets is cached.
    fn oldest_timestamp(
        &self,
        asset_ids: &[AssetId],
        currency: &CurrencyCode,
    ) -> Option<DateTime<Utc>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct VecCache {
        points: Mutex<Vec<PricePoint>>,
    }

    impl PriceCache for VecCache {
        fn get(&self, asset_id: &AssetId, currency: &CurrencyCode) -> Option<PricePoint> {
            self.points
                .lock()
                .unwrap()
                .iter()
                .find(|p| &p.asset_id == asset_id && &p.currency == currency)
                .cloned()
        }

        fn put(&self, batch: &PriceBatch) {
            self.points.lock().unwrap().extend(batch.values().cloned());
        }

        fn oldest_timestamp(
            &self,
            asset_ids: &[AssetId],
            currency: &CurrencyCode,
        ) -> Option<DateTime<Utc>> {
            asset_ids
                .iter()
                .filter_map(|id| self.get(id, currency).map(|p| p.timestamp))
                .min()
        }
    }

    struct FixedFetcher;

    #[async_trait]
    impl PriceFetcher for FixedFetcher {
        async fn fetch(
            &self,
            currency: &CurrencyCode,
            asset_ids: &[AssetId],
        ) -> Result<PriceBatch, SourceError> {
            Ok(asset_ids
                .iter()
                .map(|id| (id.clone(), PricePoint::new(id.clone(), currency.clone(), dec!(1))))
                .collect())
        }
    }

    #[test]
    fn test_get_many_skips_missing() {
        let cache = VecCache {
            points: Mutex::new(vec![PricePoint::new("BTC", "USD", dec!(65000))]),
        };

        let batch = cache.get_many(&[AssetId::new("BTC"), AssetId::new("ETH")], &"USD".into());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[&AssetId::new("BTC")].value, dec!(65000));
    }

    #[tokio::test]
    async fn test_fetcher_default_supports_every_currency() {
        let fetcher = FixedFetcher;
        assert!(fetcher.supports_currency(&"JPY".into()));

        let batch = fetcher
            .fetch(&"USD".into(), &[AssetId::new("BTC")])
            .await
            .unwrap();
        assert_eq!(batch[&AssetId::new("BTC")].currency, CurrencyCode::new("USD"));
    }
}
