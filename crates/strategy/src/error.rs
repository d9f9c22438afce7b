//! Strategy errors

use argus_core::ExchangeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    /// Market state the engine needs has not been pushed yet
    #[error("{exchange} {what} not yet available")]
    NotReady { exchange: ExchangeId, what: &'static str },

    #[error(transparent)]
    Order(#[from] argus_order_manager::Error),

    /// A multi-leg operation failed and has already been rolled back
    #[error("Leg aborted and recovered: {0}")]
    LegAborted(String),

    #[error("Invalid strategy configuration: {0}")]
    Config(String),
}

impl StrategyError {
    pub(crate) fn not_ready(exchange: &ExchangeId, what: &'static str) -> Self {
        StrategyError::NotReady {
            exchange: exchange.clone(),
            what,
        }
    }

    /// Expected this tick; log quietly and move on
    pub fn is_benign(&self) -> bool {
        match self {
            StrategyError::NotReady { .. } => true,
            StrategyError::Order(e) => e.is_benign(),
            _ => false,
        }
    }

    /// Needs failure recovery at the loop boundary.
    ///
    /// A failed exchange call means "no action this tick"; a leg abort has
    /// already been recovered inside the tick.
    pub fn is_fatal(&self) -> bool {
        match self {
            StrategyError::NotReady { .. } | StrategyError::LegAborted(_) => false,
            StrategyError::Order(e) => !e.is_benign() && e.exchange_error().is_none(),
            StrategyError::Config(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrategyError>;
