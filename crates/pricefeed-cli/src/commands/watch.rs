//! Watch command implementation.
//!
//! Subscribes to one key and prints every update until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::{debug, info};

use pricefeed_engine::BrokerBuilder;
use pricefeed_ext_file::{create_file_fetcher, EmptyPriceFetcher};
use pricefeed_traits::PriceFetcher;

use crate::cli::OutputFormat;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{print_header, print_output, print_warning, PriceRow};

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Asset ids to subscribe to
    #[arg(required = true)]
    pub assets: Vec<String>,

    /// Quote currency
    #[arg(short, long, default_value = "USD")]
    pub currency: String,

    /// Price file (.csv or .json)
    #[arg(short, long, env = "PRICEFEED_SOURCE")]
    pub source: Option<PathBuf>,

    /// Broker configuration file (TOML)
    #[arg(long, env = "PRICEFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the poll interval, in seconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Exit after this many updates
    #[arg(long)]
    pub count: Option<usize>,
}

/// Executes the watch command.
pub async fn execute(args: WatchArgs, format: OutputFormat) -> Result<()> {
    if args.assets.is_empty() {
        return Err(CliError::MissingArgument("asset ids".into()).into());
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(secs) = args.interval {
        config = config.with_poll_interval(Duration::from_secs(secs));
    }

    let fetcher: Arc<dyn PriceFetcher> = match &args.source {
        Some(path) => create_file_fetcher(path).map_err(|e| CliError::Source(e.to_string()))?,
        None => {
            print_warning("No --source given; no prices will arrive");
            Arc::new(EmptyPriceFetcher)
        }
    };

    let broker = BrokerBuilder::new()
        .with_config(config)
        .with_fetcher(fetcher)
        .build()?;

    let mut handle = broker.subscribe(
        args.assets.iter().map(String::as_str),
        args.currency.as_str(),
    )?;
    info!("Watching {}", handle.key());

    if format == OutputFormat::Table {
        print_header(&format!("Prices for {}", handle.key()));
    }

    let mut received = 0usize;
    loop {
        tokio::select! {
            update = handle.recv() => match update {
                Some(Ok(batch)) => {
                    print_output(&PriceRow::from_batch(&batch), format)?;
                    received += 1;
                    if args.count.map(|n| received >= n).unwrap_or(false) {
                        break;
                    }
                }
                Some(Err(err)) => return Err(CliError::Subscription(err.to_string()).into()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.cancel();
    broker.shutdown();
    debug!("Broker stats: {:?}", broker.stats());

    Ok(())
}
