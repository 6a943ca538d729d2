//! Output formatting utilities.

use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use pricefeed_traits::PriceBatch;

use crate::cli::OutputFormat;

/// One price as displayed.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct PriceRow {
    #[tabled(rename = "Asset")]
    pub asset_id: String,
    #[tabled(rename = "Currency")]
    pub currency: String,
    #[tabled(rename = "Price")]
    pub value: String,
    #[tabled(rename = "Observed")]
    pub timestamp: String,
}

impl PriceRow {
    /// Rows for a batch, sorted by asset id.
    pub fn from_batch(batch: &PriceBatch) -> Vec<Self> {
        let mut rows: Vec<Self> = batch
            .values()
            .map(|point| Self {
                asset_id: point.asset_id.to_string(),
                currency: point.currency.to_string(),
                value: format_price(point.value),
                timestamp: point.timestamp.to_rfc3339(),
            })
            .collect();
        rows.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        rows
    }
}

/// Formats and prints rows based on the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => print_table(data),
        OutputFormat::Json => print_json(data),
    }
}

/// Prints data as a formatted table.
fn print_table<T: Tabled>(data: &[T]) -> anyhow::Result<()> {
    if data.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let table = Table::new(data)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::left()))
        .to_string();

    println!("{}", table);
    Ok(())
}

/// Prints data as a single JSON line.
fn print_json<T: Serialize>(data: &[T]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(data)?);
    Ok(())
}

/// Formats a price, trimming trailing zeros.
pub fn format_price(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Prints a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

/// A key-value pair for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct KeyValue {
    #[tabled(rename = "Setting")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Prints a header for a section.
pub fn print_header(title: &str) {
    println!("\n{}", title.bold().underline());
}
