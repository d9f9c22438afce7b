//! Strategy engine trait and shared context
//!
//! Every engine receives its collaborators explicitly through
//! [`EngineContext`]; nothing is looked up globally.

use std::sync::Arc;

use argus_core::{ExchangeId, OpenOrder, OrderBookSnapshot, OrderSpec, PositionDirection, PositionView, Price};
use argus_gateway::MarketStateCache;
use argus_order_manager::{FailureRecovery, OrderLifecycleController, PositionReconciler, StateJournal};
use async_trait::async_trait;
use log::warn;

use crate::error::{Result, StrategyError};

/// Outcome of one decision tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    /// Position or quotes maintained, nothing new
    Hold,
    /// Waiting for a signal, a fill or market data
    Wait,
}

/// Shared collaborators, cheap to clone
#[derive(Clone)]
pub struct EngineContext {
    pub cache: MarketStateCache,
    pub controller: Arc<OrderLifecycleController>,
    pub reconciler: Arc<PositionReconciler>,
    pub recovery: Arc<FailureRecovery>,
    pub journal: Arc<StateJournal>,
}

impl EngineContext {
    pub fn book(&self, exchange: &ExchangeId) -> Result<Arc<OrderBookSnapshot>> {
        self.cache
            .order_book(exchange)
            .available()
            .ok_or_else(|| StrategyError::not_ready(exchange, "order book"))
    }

    /// Best bid and ask
    pub fn top(&self, exchange: &ExchangeId) -> Result<(Price, Price)> {
        self.book(exchange)?
            .top()
            .ok_or_else(|| StrategyError::not_ready(exchange, "top of book"))
    }

    /// Last traded price, falling back to the book mid
    pub fn last_price(&self, exchange: &ExchangeId) -> Result<Price> {
        if let Some(ticker) = self.cache.ticker(exchange).available() {
            return Ok(ticker.last_price);
        }
        self.book(exchange)?
            .mid_price()
            .ok_or_else(|| StrategyError::not_ready(exchange, "last price"))
    }

    pub fn position(&self, exchange: &ExchangeId, symbol: &str) -> PositionView {
        self.reconciler.view(exchange, symbol)
    }

    /// Open orders straight from the venue
    pub async fn open_orders(&self, exchange: &ExchangeId, symbol: &str) -> Result<Vec<OpenOrder>> {
        let client = self.controller.venue(exchange)?;
        client
            .get_open_orders(symbol)
            .await
            .map_err(|e| argus_order_manager::Error::Exchange {
                exchange: exchange.clone(),
                source: e,
            })
            .map_err(StrategyError::from)
    }

    /// Cancel everything on the symbol and close the position at market
    pub async fn force_close(&self, exchange: &ExchangeId, view: &PositionView, mark: Price, reason: &str) -> Result<Action> {
        let Some(side) = view.close_side() else {
            return Ok(Action::Hold);
        };
        let pnl = view.pnl_at(mark);
        warn!(
            "[{}] {} force-closing {:?} {} @ {} (mark {}, pnl {}): {}",
            exchange, view.symbol, view.direction, view.quantity, view.entry_price, mark, pnl, reason
        );

        if let Err(e) = self.controller.cancel_all(exchange, &view.symbol).await {
            warn!("[{}] {} cancel before force-close failed: {}", exchange, view.symbol, e);
        }
        self.controller
            .submit(exchange, OrderSpec::market(&view.symbol, side, view.quantity).reduce_only())
            .await?;
        self.journal.record_trade(pnl);

        Ok(match view.direction {
            PositionDirection::Short => Action::CloseShort,
            _ => Action::CloseLong,
        })
    }
}

/// A decision loop body. One instance per strategy, driven on a fixed tick.
#[async_trait]
pub trait StrategyEngine: Send {
    /// Engine name for logging
    fn name(&self) -> &str;

    fn symbol(&self) -> &str;

    /// Venues this engine trades; recovery flattens all of them
    fn venues(&self) -> Vec<ExchangeId>;

    /// Read current state and act on it at most once
    async fn tick(&mut self) -> Result<Action>;

    /// Forget per-position state after recovery
    fn reset(&mut self) {}
}
