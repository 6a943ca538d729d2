//! Pricefeed CLI - Watch live prices through the subscription broker.
//!
//! # Usage
//!
//! ```bash
//! # Stream BTC and ETH prices in USD from a CSV file
//! pricefeed watch --source prices.csv --currency USD BTC ETH
//!
//! # Stop after three updates, as JSON lines
//! pricefeed --format json watch --source prices.json --currency EUR --count 3 BTC
//!
//! # Show the effective broker configuration
//! pricefeed config show --config pricefeed.toml
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod error;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_filter = if cli.quiet { "warn" } else { "info,pricefeed=debug" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let format = cli.format;

    match cli.command {
        Commands::Watch(args) => commands::watch::execute(args, format).await?,
        Commands::Config(args) => commands::config::execute(args, format)?,
    }

    Ok(())
}
