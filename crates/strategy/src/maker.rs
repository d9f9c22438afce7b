//! Maker Engine
//!
//! Flat: quotes both sides at the top of book with post-only limits. When the
//! top moves or either quote stops working, both sides are canceled together
//! and reissued together as one group, so no tick leaves a single-sided quote.
//!
//! Positioned: keeps exactly one reduce-only order on the closing side (at
//! the ask when long, the bid when short) and force-closes at market once
//! the loss exceeds `loss_limit`.

use argus_core::{ExchangeId, OrderId, OrderSpec, PositionView, Price, Quantity, Side, Symbol, TimeInForce};
use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::engine::{Action, EngineContext, StrategyEngine};
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MakerConfig {
    /// Maximum loss per position, quote currency
    pub loss_limit: Decimal,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self { loss_limit: dec!(0.03) }
    }
}

/// The two-sided quote currently working
#[derive(Debug, Clone, PartialEq)]
struct Quote {
    bid: Price,
    ask: Price,
    order_ids: Vec<OrderId>,
}

pub struct MakerEngine {
    ctx: EngineContext,
    exchange: ExchangeId,
    symbol: Symbol,
    quantity: Quantity,
    config: MakerConfig,
    quote: Option<Quote>,
}

impl MakerEngine {
    pub fn new(
        ctx: EngineContext,
        exchange: ExchangeId,
        symbol: impl Into<Symbol>,
        quantity: Quantity,
        config: MakerConfig,
    ) -> Self {
        Self {
            ctx,
            exchange,
            symbol: symbol.into(),
            quantity,
            config,
            quote: None,
        }
    }

    /// Prices currently quoted, if any
    pub fn quoted(&self) -> Option<(Price, Price)> {
        self.quote.as_ref().map(|q| (q.bid, q.ask))
    }

    async fn quote_both_sides(&mut self, bid: Price, ask: Price) -> Result<Action> {
        if let Some(quote) = &self.quote {
            if quote.bid == bid && quote.ask == ask && self.quote_working(quote).await? {
                return Ok(Action::Hold);
            }
            debug!(
                "[{}] {} requoting {}/{} -> {}/{}",
                self.exchange, self.symbol, quote.bid, quote.ask, bid, ask
            );
        }

        // Both sides go before either is reissued
        self.quote = None;
        self.ctx.controller.cancel_all(&self.exchange, &self.symbol).await?;

        let specs = vec![
            OrderSpec::limit(&self.symbol, Side::Buy, self.quantity, bid, TimeInForce::GTX),
            OrderSpec::limit(&self.symbol, Side::Sell, self.quantity, ask, TimeInForce::GTX),
        ];
        let handles = self.ctx.controller.submit_group(&self.exchange, specs).await?;
        info!("[{}] {} quoting {} / {} x {}", self.exchange, self.symbol, bid, ask, self.quantity);

        self.quote = Some(Quote {
            bid,
            ask,
            order_ids: handles.into_iter().map(|h| h.order_id).collect(),
        });
        Ok(Action::Wait)
    }

    /// Both quote orders still rest unfilled on the venue
    async fn quote_working(&self, quote: &Quote) -> Result<bool> {
        let open = self.ctx.open_orders(&self.exchange, &self.symbol).await?;
        Ok(quote
            .order_ids
            .iter()
            .all(|id| open.iter().any(|o| o.order_id == *id && o.status.is_active())))
    }

    async fn hold_close_order(&mut self, view: &PositionView, bid: Price, ask: Price) -> Result<Action> {
        self.quote = None;

        let mark = if view.signed_quantity() > Decimal::ZERO { bid } else { ask };
        if view.pnl_at(mark) < -self.config.loss_limit {
            return self
                .ctx
                .force_close(&self.exchange, view, mark, "loss limit breached")
                .await;
        }

        let Some(close_side) = view.close_side() else {
            return Ok(Action::Hold);
        };
        let close_price = if close_side == Side::Sell { ask } else { bid };

        let mut has_close = false;
        for order in self.ctx.open_orders(&self.exchange, &self.symbol).await? {
            let keeps = !has_close
                && order.side == close_side
                && order.reduce_only
                && order.price == Some(close_price);
            if keeps {
                has_close = true;
                continue;
            }
            self.ctx
                .controller
                .cancel_order(&self.exchange, &self.symbol, &order.order_id)
                .await?;
            debug!(
                "[{}] {} canceled {} {:?} not matching close {} @ {}",
                self.exchange, self.symbol, order.side, order.price, close_side, close_price
            );
        }

        if !has_close {
            let spec = OrderSpec::limit(&self.symbol, close_side, view.quantity, close_price, TimeInForce::GTX)
                .reduce_only();
            match self.ctx.controller.submit(&self.exchange, spec).await {
                Ok(handle) => info!(
                    "[{}] {} close order {} {} @ {} ({})",
                    self.exchange, self.symbol, close_side, view.quantity, close_price, handle.order_id
                ),
                Err(e) if e.is_benign() => debug!("[{}] {} {}", self.exchange, self.symbol, e),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Action::Hold)
    }
}

#[async_trait]
impl StrategyEngine for MakerEngine {
    fn name(&self) -> &str {
        "maker"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn venues(&self) -> Vec<ExchangeId> {
        vec![self.exchange.clone()]
    }

    async fn tick(&mut self) -> Result<Action> {
        let (bid, ask) = self.ctx.top(&self.exchange)?;
        let view = self.ctx.position(&self.exchange, &self.symbol);

        if view.is_open() {
            self.hold_close_order(&view, bid, ask).await
        } else {
            self.quote_both_sides(bid, ask).await
        }
    }

    fn reset(&mut self) {
        self.quote = None;
    }
}
