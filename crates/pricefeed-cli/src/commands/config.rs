//! Config command implementation.
//!
//! Shows, validates and prints broker configuration files.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use pricefeed_engine::BrokerConfig;

use crate::cli::OutputFormat;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{print_header, print_output, KeyValue};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Check a configuration file
    Validate(ValidateArgs),

    /// Print the default configuration as TOML
    Default,
}

/// Arguments for show subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Configuration file (defaults apply when omitted)
    #[arg(long, env = "PRICEFEED_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Arguments for validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file
    pub path: PathBuf,
}

/// Executes the config command.
pub fn execute(args: ConfigArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        ConfigCommand::Show(show) => {
            let config = load_config(show.config.as_deref())?;
            match format {
                OutputFormat::Table => {
                    print_header("Broker configuration");
                    print_output(&rows(&config), format)?;
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            }
        }
        ConfigCommand::Validate(validate) => {
            load_config(Some(validate.path.as_path()))?;
            println!("{} {} is valid", "✓".green(), validate.path.display());
        }
        ConfigCommand::Default => {
            let rendered = toml::to_string_pretty(&BrokerConfig::default())
                .map_err(|e| CliError::Config(e.to_string()))?;
            print!("{}", rendered);
        }
    }
    Ok(())
}

fn rows(config: &BrokerConfig) -> Vec<KeyValue> {
    let currencies = config
        .supported_currencies
        .as_ref()
        .map(|list| list.join(", "))
        .unwrap_or_else(|| "all".to_string());

    vec![
        KeyValue::new("poll_interval_secs", config.poll_interval_secs.to_string()),
        KeyValue::new("fetch_timeout_ms", config.fetch_timeout_ms.to_string()),
        KeyValue::new("supported_currencies", currencies),
        KeyValue::new("replay_cached", config.replay_cached.to_string()),
        KeyValue::new("stale_threshold_secs", config.stale_threshold_secs.to_string()),
    ]
}
