//! Runner errors

use argus_core::ExchangeId;
use argus_gateway::GatewayError;
use argus_ports::ExchangeError;
use argus_strategy::StrategyError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Order(#[from] argus_order_manager::Error),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("[{exchange}] venue setup failed: {source}")]
    Setup {
        exchange: ExchangeId,
        #[source]
        source: ExchangeError,
    },

    /// A feed listener gave up; the process should exit
    #[error(transparent)]
    Feed(#[from] GatewayError),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
