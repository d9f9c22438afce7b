//! Immutable push-event records.
//!
//! Venue listeners publish these onto a bounded channel; a single updater
//! drains it into the market-state cache and the order lifecycle controller.

use serde::{Deserialize, Serialize};

use crate::entities::{AccountSnapshot, ExchangeId, Kline, OpenOrder, OrderBookSnapshot, OrderUpdate, Ticker};
use crate::values::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushEvent {
    OrderBook(OrderBookSnapshot),
    Ticker(Ticker),
    Account(AccountSnapshot),
    /// A single order changed status
    OrderUpdate(OrderUpdate),
    /// Full open-orders listing for a symbol
    OpenOrders { symbol: Symbol, orders: Vec<OpenOrder> },
    Klines { symbol: Symbol, klines: Vec<Kline> },
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::OrderBook(_) => "order_book",
            PushEvent::Ticker(_) => "ticker",
            PushEvent::Account(_) => "account",
            PushEvent::OrderUpdate(_) => "order_update",
            PushEvent::OpenOrders { .. } => "open_orders",
            PushEvent::Klines { .. } => "klines",
        }
    }
}

/// A push event tagged with the venue it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueEvent {
    pub exchange: ExchangeId,
    pub event: PushEvent,
}

impl VenueEvent {
    pub fn new(exchange: ExchangeId, event: PushEvent) -> Self {
        Self { exchange, event }
    }
}
