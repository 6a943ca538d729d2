//! CLI command implementations.

pub mod config;
pub mod watch;

pub use config::ConfigArgs;
pub use watch::WatchArgs;

use std::path::Path;

use pricefeed_engine::BrokerConfig;

use crate::error::{CliError, CliResult};

/// Loads the broker configuration, falling back to defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> CliResult<BrokerConfig> {
    match path {
        Some(path) => BrokerConfig::from_file(path).map_err(|e| CliError::Config(e.to_string())),
        None => Ok(BrokerConfig::default()),
    }
}
