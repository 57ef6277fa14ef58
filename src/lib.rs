#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod models;
pub mod report;
pub mod utils;

// Re-export commonly used types outside of crate (for main.rs and embedders)
pub use config::{EngineConfig, Interval};
pub use data::{BinanceProvider, CandleSource};
pub use engine::{EngineStatus, MarketEngine, StreamStatus};
pub use error::{EngineError, Result};
pub use models::{BreakoutAlert, MarketSignal, MarketState};

// CLI argument parsing
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Comma-separated symbols, overriding the config file (e.g. BTCUSDT,ETHUSDT)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Seconds between status tables. 0 disables them.
    #[arg(long, default_value_t = 60)]
    pub status_every: u64,

    /// Log at info level in release builds too
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Loads the config file (or defaults) and applies command-line overrides.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if !self.symbols.is_empty() {
            config.symbols = self.symbols.clone();
        }
        config.normalise();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_flag_overrides_defaults() {
        let cli = Cli::parse_from(["market-pulse", "--symbols", "solusdt,btcusdt"]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.symbols, vec!["SOLUSDT", "BTCUSDT"]);
        assert_eq!(cli.status_every, 60);
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let cli = Cli::parse_from(["market-pulse", "--config", "/nonexistent/pulse.toml"]);
        assert!(matches!(cli.engine_config(), Err(EngineError::ConfigValidation(_))));
    }
}
