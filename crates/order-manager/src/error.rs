//! Order Manager errors

use argus_core::{ExchangeId, OrderCategory, OrderId, OrderStatus, Symbol};
use argus_ports::ExchangeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("[{exchange}] {symbol} {category} already has an order in flight")]
    AlreadyLocked {
        exchange: ExchangeId,
        symbol: Symbol,
        category: OrderCategory,
    },

    #[error("Unknown exchange: {0}")]
    UnknownExchange(ExchangeId),

    #[error("[{exchange}] {source}")]
    Exchange {
        exchange: ExchangeId,
        #[source]
        source: ExchangeError,
    },

    #[error("Invalid order group: {0}")]
    InvalidGroup(String),

    #[error("[{exchange}] order {order_id} not filled after {rounds} polls")]
    FillTimeout {
        exchange: ExchangeId,
        order_id: OrderId,
        rounds: u32,
    },

    #[error("[{exchange}] order {order_id} ended {status:?} without filling")]
    NotFilled {
        exchange: ExchangeId,
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Journal error: {0}")]
    Journal(String),
}

impl Error {
    pub(crate) fn exchange(exchange: &ExchangeId, source: ExchangeError) -> Self {
        Error::Exchange {
            exchange: exchange.clone(),
            source,
        }
    }

    /// Expected contention: the caller skips the action this tick
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::AlreadyLocked { .. })
    }

    /// The exchange call itself failed (submission, cancel, poll)
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            Error::Exchange { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
