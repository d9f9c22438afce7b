//! Startup configuration
//!
//! One JSON document per process:
//!
//! ```json
//! {
//!   "symbol": "BTCUSDT",
//!   "quantity": "0.001",
//!   "leverage": 20,
//!   "journal_path": "argus-journal.json",
//!   "exchanges": [
//!     { "id": "aster", "kind": "paper", "api_key_env": "ASTER_API_KEY", "api_secret_env": "ASTER_API_SECRET",
//!       "seed_book": { "bid": "64000", "ask": "64001" } }
//!   ],
//!   "strategy": { "kind": "maker", "maker": { "loss_limit": "0.03" } }
//! }
//! ```
//!
//! Credentials never appear in the file; only the names of the environment
//! variables holding them do.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use argus_core::ExchangeId;
use argus_gateway::Credentials;
use argus_order_manager::{ControllerConfig, FillWait};
use argus_strategy::{ArbitrageConfig, DEFAULT_SMA_PERIOD, MakerConfig, TrendConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No exchanges in config")]
    NoExchanges,
    #[error("Exchange {0} configured twice")]
    DuplicateExchange(String),
    #[error("{strategy} strategy needs {needed} exchange(s), {configured} configured")]
    NotEnoughExchanges {
        strategy: StrategyKind,
        needed: usize,
        configured: usize,
    },
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Environment variable {0} is not set")]
    MissingCredential(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Trend,
    Maker,
    Arbitrage,
}

impl StrategyKind {
    /// Venues the engine trades, taken from the front of `exchanges`
    pub fn venues_needed(&self) -> usize {
        match self {
            StrategyKind::Trend | StrategyKind::Maker => 1,
            StrategyKind::Arbitrage => 2,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StrategyKind::Trend => "trend",
            StrategyKind::Maker => "maker",
            StrategyKind::Arbitrage => "arbitrage",
        })
    }
}

/// Strategy selection plus every engine's settings; only the selected
/// engine's section is used, so `--strategy` can switch without editing
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    pub kind: StrategyKind,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default)]
    pub maker: MakerConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// In-memory venue
    Paper,
}

/// Initial top of book for a paper venue
#[derive(Debug, Clone, Deserialize)]
pub struct SeedBook {
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(default = "default_seed_size")]
    pub size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub id: String,
    pub kind: VenueKind,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_secret_env: Option<String>,
    #[serde(default)]
    pub seed_book: Option<SeedBook>,
}

impl ExchangeConfig {
    pub fn exchange_id(&self) -> ExchangeId {
        ExchangeId::new(self.id.as_str())
    }

    /// Resolve credentials from the environment. `None` when no variables
    /// are named; an error when a named variable is unset.
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let (Some(key_var), Some(secret_var)) = (&self.api_key_env, &self.api_secret_env) else {
            return Ok(None);
        };
        let read = |var: &String| std::env::var(var).map_err(|_| ConfigError::MissingCredential(var.clone()));
        Ok(Some(Credentials::new(read(key_var)?, read(secret_var)?)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub symbol: String,
    /// Order size per entry, base asset
    pub quantity: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_lock_deadline_ms")]
    pub lock_deadline_ms: u64,
    #[serde(default = "default_fill_poll_rounds")]
    pub fill_poll_rounds: u32,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    pub exchanges: Vec<ExchangeConfig>,
    pub strategy: StrategySection,
}

fn default_leverage() -> u32 {
    1
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_lock_deadline_ms() -> u64 {
    3000
}

fn default_fill_poll_rounds() -> u32 {
    20
}

fn default_fill_poll_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_sma_period() -> usize {
    DEFAULT_SMA_PERIOD
}

fn default_seed_size() -> Decimal {
    Decimal::ONE
}

/// Load runner configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunnerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<RunnerConfig, ConfigError> {
    let config: RunnerConfig = serde_json::from_str(json)?;
    Ok(config)
}

impl RunnerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol", "empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(invalid("quantity", format!("{} is not positive", self.quantity)));
        }
        if self.leverage == 0 {
            return Err(invalid("leverage", "must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be positive"));
        }
        if self.fill_poll_rounds == 0 {
            return Err(invalid("fill_poll_rounds", "must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity", "must be positive"));
        }

        if self.exchanges.is_empty() {
            return Err(ConfigError::NoExchanges);
        }
        let mut seen = HashSet::new();
        for exchange in &self.exchanges {
            if !seen.insert(exchange.id.as_str()) {
                return Err(ConfigError::DuplicateExchange(exchange.id.clone()));
            }
            if let Some(seed) = &exchange.seed_book {
                if seed.bid >= seed.ask {
                    return Err(invalid("seed_book", format!("{} bid {} not below ask {}", exchange.id, seed.bid, seed.ask)));
                }
            }
        }

        let needed = self.strategy.kind.venues_needed();
        if self.exchanges.len() < needed {
            return Err(ConfigError::NotEnoughExchanges {
                strategy: self.strategy.kind,
                needed,
                configured: self.exchanges.len(),
            });
        }
        Ok(())
    }

    /// Venues the selected engine trades
    pub fn strategy_venues(&self) -> Vec<ExchangeId> {
        self.exchanges
            .iter()
            .take(self.strategy.kind.venues_needed())
            .map(ExchangeConfig::exchange_id)
            .collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            lock_deadline: Duration::from_millis(self.lock_deadline_ms),
            ..Default::default()
        }
    }

    pub fn fill_wait(&self) -> FillWait {
        FillWait {
            rounds: self.fill_poll_rounds,
            interval: Duration::from_millis(self.fill_poll_interval_ms),
        }
    }

    /// Arbitrage settings with the process-wide fill polling applied
    pub fn arbitrage_config(&self) -> ArbitrageConfig {
        ArbitrageConfig {
            fill_poll_rounds: self.fill_poll_rounds,
            fill_poll_interval_ms: self.fill_poll_interval_ms,
            ..self.strategy.arbitrage.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"{
        "symbol": "BTCUSDT",
        "quantity": "0.001",
        "exchanges": [{ "id": "aster", "kind": "paper" }],
        "strategy": { "kind": "maker" }
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = load_config_from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.quantity, dec!(0.001));
        assert_eq!(config.leverage, 1);
        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.lock_deadline_ms, 3000);
        assert_eq!(config.fill_poll_rounds, 20);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.journal_path.is_none());
        assert_eq!(config.strategy.sma_period, DEFAULT_SMA_PERIOD);
        assert_eq!(config.strategy.maker.loss_limit, dec!(0.03));
        assert_eq!(config.strategy_venues(), vec![ExchangeId::new("aster")]);
    }

    #[test]
    fn test_engine_sections_parse() {
        let json = r#"{
            "symbol": "ETHUSDT",
            "quantity": "0.5",
            "leverage": 20,
            "fill_poll_rounds": 5,
            "exchanges": [
                { "id": "aster", "kind": "paper", "seed_book": { "bid": "3000", "ask": "3001" } },
                { "id": "backpack", "kind": "paper" }
            ],
            "strategy": {
                "kind": "arbitrage",
                "arbitrage": { "threshold": "12.5", "close_threshold": "2" },
                "trend": { "loss_limit": "5" }
            }
        }"#;
        let config = load_config_from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.strategy.kind, StrategyKind::Arbitrage);
        let arb = config.arbitrage_config();
        assert_eq!(arb.threshold, dec!(12.5));
        assert_eq!(arb.close_threshold, dec!(2));
        assert_eq!(arb.fill_poll_rounds, 5);
        assert_eq!(config.strategy.trend.loss_limit, dec!(5));
        assert_eq!(config.exchanges[0].seed_book.as_ref().unwrap().size, dec!(1));
        assert_eq!(config.strategy_venues().len(), 2);
    }

    #[test]
    fn test_arbitrage_needs_two_venues() {
        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.strategy.kind = StrategyKind::Arbitrage;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotEnoughExchanges { needed: 2, configured: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.quantity = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "quantity", .. })));

        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.exchanges.push(config.exchanges[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateExchange(_))));

        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.exchanges.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoExchanges)));
    }

    #[test]
    fn test_unknown_venue_kind_fails_to_parse() {
        let json = MINIMAL.replace("\"paper\"", "\"ftx\"");
        assert!(matches!(load_config_from_str(&json), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_credential_variable() {
        let exchange = ExchangeConfig {
            id: "aster".into(),
            kind: VenueKind::Paper,
            api_key_env: Some("ARGUS_TEST_UNSET_KEY_7f3a".into()),
            api_secret_env: Some("ARGUS_TEST_UNSET_SECRET_7f3a".into()),
            seed_book: None,
        };
        assert!(matches!(exchange.credentials(), Err(ConfigError::MissingCredential(_))));

        let anonymous = ExchangeConfig {
            api_key_env: None,
            api_secret_env: None,
            ..exchange
        };
        assert!(anonymous.credentials().unwrap().is_none());
    }
}
