//! # Pricefeed Ext File
//!
//! File-based price fetchers for the Pricefeed subscription broker.
//!
//! This crate provides default implementations for demos, tests and offline use:
//! - CSV-based price fetcher
//! - JSON-based price fetcher
//! - An empty fetcher that quotes nothing
//!
//! For live prices, implement [`PriceFetcher`] against a real provider.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fetcher;

pub use fetcher::*;

use std::path::Path;
use std::sync::Arc;

use pricefeed_traits::{PriceFetcher, SourceError};

/// Create a file-based price fetcher, picking the format from the extension.
///
/// `.json` files are read with [`JsonPriceFetcher`]; anything else is treated
/// as CSV and re-read on every fetch.
pub fn create_file_fetcher(path: impl AsRef<Path>) -> Result<Arc<dyn PriceFetcher>, SourceError> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        Ok(Arc::new(JsonPriceFetcher::new(path)?))
    } else {
        Ok(Arc::new(CsvPriceFetcher::new(path)?.with_reload_on_fetch(true)))
    }
}
