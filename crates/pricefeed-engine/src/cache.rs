//! In-memory price cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use pricefeed_traits::{AssetId, CurrencyCode, PriceBatch, PriceCache, PricePoint};

/// Price cache with staleness tracking.
///
/// Keeps the newest price per (asset, currency); an older point never
/// replaces a newer one.
pub struct InMemoryPriceCache {
    prices: DashMap<(AssetId, CurrencyCode), PricePoint>,
    stale_threshold: Duration,
}

impl InMemoryPriceCache {
    /// Create a new price cache.
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            prices: DashMap::new(),
            stale_threshold,
        }
    }

    /// Check if a price is missing or older than the stale threshold.
    pub fn is_stale(&self, asset_id: &AssetId, currency: &CurrencyCode) -> bool {
        self.prices
            .get(&(asset_id.clone(), currency.clone()))
            .map(|p| age(p.timestamp) > self.stale_threshold)
            .unwrap_or(true)
    }

    /// Remove stale prices.
    pub fn cleanup_stale(&self) {
        self.prices
            .retain(|_, p| age(p.timestamp) <= self.stale_threshold);
    }

    /// Number of cached prices.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Clear all prices.
    pub fn clear(&self) {
        self.prices.clear();
    }
}

impl Default for InMemoryPriceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600)) // 10 minutes
    }
}

impl PriceCache for InMemoryPriceCache {
    fn get(&self, asset_id: &AssetId, currency: &CurrencyCode) -> Option<PricePoint> {
        self.prices
            .get(&(asset_id.clone(), currency.clone()))
            .map(|p| p.clone())
    }

    fn put(&self, batch: &PriceBatch) {
        for point in batch.values() {
            let key = (point.asset_id.clone(), point.currency.clone());
            self.prices
                .entry(key)
                .and_modify(|existing| {
                    if point.timestamp >= existing.timestamp {
                        *existing = point.clone();
                    }
                })
                .or_insert_with(|| point.clone());
        }
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

fn age(timestamp: DateTime<Utc>) -> Duration {
    (Utc::now() - timestamp).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn batch(points: Vec<PricePoint>) -> PriceBatch {
        points.into_iter().map(|p| (p.asset_id.clone(), p)).collect()
    }

    #[test]
    fn test_put_and_get() {
        let cache = InMemoryPriceCache::default();
        cache.put(&batch(vec![
            PricePoint::new("BTC", "USD", dec!(65000)),
            PricePoint::new("ETH", "USD", dec!(3200)),
        ]));

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get(&"BTC".into(), &"USD".into()).unwrap().value,
            dec!(65000)
        );
        assert!(cache.get(&"BTC".into(), &"EUR".into()).is_none());
    }

    #[test]
    fn test_older_point_does_not_overwrite() {
        let cache = InMemoryPriceCache::default();
        let now = Utc::now();

        cache.put(&batch(vec![
            PricePoint::new("BTC", "USD", dec!(2)).with_timestamp(now)
        ]));
        cache.put(&batch(vec![PricePoint::new("BTC", "USD", dec!(1))
            .with_timestamp(now - chrono::Duration::seconds(30))]));

        assert_eq!(cache.get(&"BTC".into(), &"USD".into()).unwrap().value, dec!(2));
    }

    #[test]
    fn test_oldest_timestamp() {
        let cache = InMemoryPriceCache::default();
        let now = Utc::now();
        let older = now - chrono::Duration::minutes(5);

        cache.put(&batch(vec![
            PricePoint::new("BTC", "USD", dec!(1)).with_timestamp(now),
            PricePoint::new("ETH", "USD", dec!(1)).with_timestamp(older),
        ]));

        let ids: Vec<AssetId> = vec!["BTC".into(), "ETH".into(), "SOL".into()];
        assert_eq!(cache.oldest_timestamp(&ids, &"USD".into()), Some(older));
        assert_eq!(cache.oldest_timestamp(&[AssetId::new("SOL")], &"USD".into()), None);
    }

    #[test]
    fn test_staleness() {
        let cache = InMemoryPriceCache::new(Duration::from_secs(60));
        let now = Utc::now();

        cache.put(&batch(vec![
            PricePoint::new("BTC", "USD", dec!(1)).with_timestamp(now),
            PricePoint::new("ETH", "USD", dec!(1))
                .with_timestamp(now - chrono::Duration::minutes(10)),
        ]));

        assert!(!cache.is_stale(&"BTC".into(), &"USD".into()));
        assert!(cache.is_stale(&"ETH".into(), &"USD".into()));
        assert!(cache.is_stale(&"SOL".into(), &"USD".into()));

        cache.cleanup_stale();
        assert_eq!(cache.len(), 1);
    }
}
