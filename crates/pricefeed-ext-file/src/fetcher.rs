//! File-based price fetchers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use pricefeed_traits::{AssetId, CurrencyCode, PriceBatch, PriceFetcher, PricePoint, SourceError};

/// Prices loaded from a file, grouped by currency.
#[derive(Default)]
struct PriceTable {
    prices: DashMap<CurrencyCode, HashMap<AssetId, PricePoint>>,
}

impl PriceTable {
    fn replace(&self, loaded: HashMap<CurrencyCode, HashMap<AssetId, PricePoint>>) {
        // Overwrite in place so concurrent lookups never see a missing currency mid-reload.
        self.prices.retain(|currency, _| loaded.contains_key(currency));
        for (currency, points) in loaded {
            self.prices.insert(currency, points);
        }
    }

    fn supports(&self, currency: &CurrencyCode) -> bool {
        self.prices.contains_key(currency)
    }

    fn lookup(&self, currency: &CurrencyCode, asset_ids: &[AssetId]) -> Result<PriceBatch, SourceError> {
        let points = self
            .prices
            .get(currency)
            .ok_or_else(|| SourceError::UnsupportedCurrency(currency.to_string()))?;

        Ok(asset_ids
            .iter()
            .filter_map(|id| points.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    fn len(&self) -> usize {
        self.prices.iter().map(|entry| entry.value().len()).sum()
    }
}

fn to_decimal(value: f64, asset_id: &str) -> Result<Decimal, SourceError> {
    Decimal::try_from(value)
        .map_err(|e| SourceError::ParseError(format!("{}: {}", asset_id, e)))
}

// =============================================================================
// CSV PRICE FETCHER
// =============================================================================

/// CSV record for prices.
#[derive(Debug, Deserialize)]
struct PriceRecord {
    asset_id: String,
    currency: String,
    value: f64,
    timestamp: Option<DateTime<Utc>>,
}

/// CSV-based price fetcher for demos and offline use.
///
/// Expects a header row `asset_id,currency,value[,timestamp]`. Currencies that
/// do not appear in the file are reported as unsupported.
pub struct CsvPriceFetcher {
    file_path: PathBuf,
    table: PriceTable,
    reload_on_fetch: bool,
}

impl CsvPriceFetcher {
    /// Create a new CSV price fetcher.
    pub fn new(file_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let fetcher = Self {
            file_path: file_path.as_ref().to_path_buf(),
            table: PriceTable::default(),
            reload_on_fetch: false,
        };
        fetcher.reload()?;
        Ok(fetcher)
    }

    /// Re-read the file before every fetch, so edits show up on the next poll.
    pub fn with_reload_on_fetch(mut self, reload: bool) -> Self {
        self.reload_on_fetch = reload;
        self
    }

    /// Reload prices from file.
    pub fn reload(&self) -> Result<(), SourceError> {
        if !self.file_path.exists() {
            return Ok(()); // Empty source
        }

        let mut reader = csv::Reader::from_path(&self.file_path)
            .map_err(|e| SourceError::IoError(e.to_string()))?;

        let mut loaded: HashMap<CurrencyCode, HashMap<AssetId, PricePoint>> = HashMap::new();
        for result in reader.deserialize() {
            let record: PriceRecord = result.map_err(|e| SourceError::ParseError(e.to_string()))?;

            let mut point = PricePoint::new(
                record.asset_id.as_str(),
                record.currency.as_str(),
                to_decimal(record.value, &record.asset_id)?,
            );
            if let Some(ts) = record.timestamp {
                point = point.with_timestamp(ts);
            }

            loaded
                .entry(point.currency.clone())
                .or_default()
                .insert(point.asset_id.clone(), point);
        }

        self.table.replace(loaded);
        debug!("Loaded {} price(s) from {}", self.table.len(), self.file_path.display());
        Ok(())
    }

    /// Number of loaded prices.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no prices are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PriceFetcher for CsvPriceFetcher {
    async fn fetch(
        &self,
        currency: &CurrencyCode,
        asset_ids: &[AssetId],
    ) -> Result<PriceBatch, SourceError> {
        if self.reload_on_fetch {
            self.reload()?;
        }
        self.table.lookup(currency, asset_ids)
    }

    fn supports_currency(&self, currency: &CurrencyCode) -> bool {
        self.reload_on_fetch || self.table.supports(currency)
    }
}

// =============================================================================
// JSON PRICE FETCHER
// =============================================================================

/// JSON-based price fetcher.
///
/// The file maps currency to asset to price:
///
/// ```json
/// { "USD": { "BTC": 65000.5, "ETH": 3200 }, "EUR": { "BTC": 60000 } }
/// ```
pub struct JsonPriceFetcher {
    file_path: PathBuf,
    table: PriceTable,
}

impl JsonPriceFetcher {
    /// Create a new JSON price fetcher.
    pub fn new(file_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let fetcher = Self {
            file_path: file_path.as_ref().to_path_buf(),
            table: PriceTable::default(),
        };
        fetcher.reload()?;
        Ok(fetcher)
    }

    /// Reload prices from file.
    pub fn reload(&self) -> Result<(), SourceError> {
        if !self.file_path.exists() {
            return Ok(()); // Empty source
        }

        let content = std::fs::read_to_string(&self.file_path)?;
        let raw: HashMap<String, HashMap<String, f64>> =
            serde_json::from_str(&content).map_err(|e| SourceError::ParseError(e.to_string()))?;

        let mut loaded = HashMap::new();
        for (currency, assets) in raw {
            let currency = CurrencyCode::new(currency);
            let mut points = HashMap::new();
            for (asset_id, value) in assets {
                let value = to_decimal(value, &asset_id)?;
                let point = PricePoint::new(asset_id.as_str(), currency.clone(), value);
                points.insert(point.asset_id.clone(), point);
            }
            loaded.insert(currency, points);
        }

        self.table.replace(loaded);
        debug!("Loaded {} price(s) from {}", self.table.len(), self.file_path.display());
        Ok(())
    }
}

#[async_trait]
impl PriceFetcher for JsonPriceFetcher {
    async fn fetch(
        &self,
        currency: &CurrencyCode,
        asset_ids: &[AssetId],
    ) -> Result<PriceBatch, SourceError> {
        self.table.lookup(currency, asset_ids)
    }

    fn supports_currency(&self, currency: &CurrencyCode) -> bool {
        self.table.supports(currency)
    }
}

// =============================================================================
// EMPTY FETCHER
// =============================================================================

/// Fetcher that knows every currency and no prices.
pub struct EmptyPriceFetcher;

#[async_trait]
impl PriceFetcher for EmptyPriceFetcher {
    async fn fetch(
        &self,
        _currency: &CurrencyCode,
        _asset_ids: &[AssetId],
    ) -> Result<PriceBatch, SourceError> {
        Ok(PriceBatch::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn ids(names: &[&str]) -> Vec<AssetId> {
        names.iter().map(|n| AssetId::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_csv_fetch() {
        let file = write_file(
            "asset_id,currency,value,timestamp\n\
             BTC,USD,65000.5,2024-03-01T12:00:00Z\n\
             ETH,USD,3200,\n\
             BTC,EUR,60000,\n",
        );
        let fetcher = CsvPriceFetcher::new(file.path()).unwrap();
        assert_eq!(fetcher.len(), 3);

        let batch = fetcher
            .fetch(&"USD".into(), &ids(&["BTC", "ETH", "SOL"]))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&AssetId::new("BTC")].value, dec!(65000.5));
        assert_eq!(
            batch[&AssetId::new("BTC")].timestamp.to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
        assert_eq!(batch[&AssetId::new("ETH")].value, dec!(3200));
    }

    #[tokio::test]
    async fn test_csv_unknown_currency_is_unsupported() {
        let file = write_file("asset_id,currency,value,timestamp\nBTC,USD,1,\n");
        let fetcher = CsvPriceFetcher::new(file.path()).unwrap();

        assert!(fetcher.supports_currency(&"USD".into()));
        assert!(!fetcher.supports_currency(&"JPY".into()));

        let err = fetcher.fetch(&"JPY".into(), &ids(&["BTC"])).await.unwrap_err();
        assert_eq!(err, SourceError::UnsupportedCurrency("JPY".into()));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_csv_reload_on_fetch() {
        let file = write_file("asset_id,currency,value,timestamp\nBTC,USD,1,\n");
        let fetcher = CsvPriceFetcher::new(file.path())
            .unwrap()
            .with_reload_on_fetch(true);

        std::fs::write(file.path(), "asset_id,currency,value,timestamp\nBTC,USD,2,\n").unwrap();

        let batch = fetcher.fetch(&"USD".into(), &ids(&["BTC"])).await.unwrap();
        assert_eq!(batch[&AssetId::new("BTC")].value, dec!(2));
    }

    #[test]
    fn test_csv_malformed_row() {
        let file = write_file("asset_id,currency,value,timestamp\nBTC,USD,not-a-number,\n");
        let result = CsvPriceFetcher::new(file.path());
        assert!(matches!(result, Err(SourceError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_is_empty_source() {
        let fetcher = CsvPriceFetcher::new("/nonexistent/prices.csv").unwrap();
        assert!(fetcher.is_empty());
        assert!(!fetcher.supports_currency(&"USD".into()));
    }

    #[tokio::test]
    async fn test_json_fetch() {
        let file = write_file(r#"{ "USD": { "BTC": 65000.5, "ETH": 3200 }, "EUR": { "BTC": 60000 } }"#);
        let fetcher = JsonPriceFetcher::new(file.path()).unwrap();

        let batch = fetcher
            .fetch(&"EUR".into(), &ids(&["BTC", "ETH"]))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[&AssetId::new("BTC")].value, dec!(60000));
        assert_eq!(batch[&AssetId::new("BTC")].currency, CurrencyCode::new("EUR"));

        assert!(!fetcher.supports_currency(&"GBP".into()));
    }

    #[test]
    fn test_json_malformed() {
        let file = write_file("[1, 2, 3]");
        assert!(matches!(
            JsonPriceFetcher::new(file.path()),
            Err(SourceError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_fetcher() {
        let fetcher = EmptyPriceFetcher;
        assert!(fetcher.supports_currency(&"USD".into()));
        let batch = fetcher.fetch(&"USD".into(), &ids(&["BTC"])).await.unwrap();
        assert!(batch.is_empty());
    }
}
