//! Trend Engine
//!
//! Flat: opens at market in the direction the price crosses the moving
//! average.
//!
//! Positioned:
//! - force-closes at market once the loss exceeds `loss_limit`, whatever
//!   state the resting stop is in
//! - keeps a stop at `entry ∓ loss_limit / qty`
//! - once profit exceeds `profit_lock_trigger`, moves the stop to
//!   `entry ± profit_lock / qty` (second tier)
//! - keeps one trailing stop activated at `entry ± trailing_profit / qty`

use std::sync::Arc;

use argus_core::{ExchangeId, OpenOrder, OrderCategory, OrderSpec, PositionView, Price, Quantity, Side, Symbol};
use argus_ports::{Cross, MarketHistory, Signal};
use async_trait::async_trait;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::engine::{Action, EngineContext, StrategyEngine};
use crate::error::{Result, StrategyError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Maximum loss per position, quote currency
    pub loss_limit: Decimal,
    /// Profit at which the stop moves into profit
    pub profit_lock_trigger: Decimal,
    /// Profit the relocated stop guarantees
    pub profit_lock: Decimal,
    /// Profit at which the trailing stop activates
    pub trailing_profit: Decimal,
    /// Trailing stop callback, percent
    pub trailing_callback_rate: Decimal,
    /// Stop prices are rounded to this increment
    pub price_tick: Decimal,
    /// A resting stop within this distance of its target is left alone
    pub stop_tolerance: Decimal,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            loss_limit: dec!(0.03),
            profit_lock_trigger: dec!(0.1),
            profit_lock: dec!(0.05),
            trailing_profit: dec!(0.2),
            trailing_callback_rate: dec!(0.2),
            price_tick: dec!(0.1),
            stop_tolerance: dec!(0.01),
        }
    }
}

pub struct TrendEngine {
    ctx: EngineContext,
    exchange: ExchangeId,
    symbol: Symbol,
    quantity: Quantity,
    config: TrendConfig,
    signal: Arc<dyn Signal>,
    previous_price: Option<Price>,
}

impl TrendEngine {
    pub fn new(
        ctx: EngineContext,
        exchange: ExchangeId,
        symbol: impl Into<Symbol>,
        quantity: Quantity,
        config: TrendConfig,
        signal: Arc<dyn Signal>,
    ) -> Self {
        Self {
            ctx,
            exchange,
            symbol: symbol.into(),
            quantity,
            config,
            signal,
            previous_price: None,
        }
    }

    fn round(&self, price: Price) -> Price {
        if self.config.price_tick.is_zero() {
            return price;
        }
        (price / self.config.price_tick).round() * self.config.price_tick
    }

    /// Distance in price that `amount` of pnl represents for `view`
    fn per_unit(&self, view: &PositionView, amount: Decimal) -> Decimal {
        if view.quantity.is_zero() { Decimal::ZERO } else { amount / view.quantity }
    }

    fn loss_stop_price(&self, view: &PositionView, side: Side) -> Price {
        let d = self.per_unit(view, self.config.loss_limit);
        self.round(if side == Side::Sell { view.entry_price - d } else { view.entry_price + d })
    }

    fn profit_stop_price(&self, view: &PositionView, side: Side) -> Price {
        let d = self.per_unit(view, self.config.profit_lock);
        self.round(if side == Side::Sell { view.entry_price + d } else { view.entry_price - d })
    }

    fn trailing_activation(&self, view: &PositionView, side: Side) -> Price {
        let d = self.per_unit(view, self.config.trailing_profit);
        self.round(if side == Side::Sell { view.entry_price + d } else { view.entry_price - d })
    }

    async fn open(&mut self, price: Price) -> Result<Action> {
        let closes: Vec<Price> = match self.ctx.cache.klines(&self.exchange).available() {
            Some(klines) => klines.iter().map(|k| k.close).collect(),
            None => return Err(StrategyError::not_ready(&self.exchange, "klines")),
        };
        let history = MarketHistory {
            closes,
            price,
            previous_price: self.previous_price,
        };
        let decision = self.signal.decide(&history);
        debug!(
            "[{}] {} {} trend {:?} cross {:?} at {}",
            self.exchange,
            self.symbol,
            self.signal.name(),
            decision.trend,
            decision.cross,
            price
        );

        let (side, action) = match decision.cross {
            Some(Cross::Above) => (Side::Buy, Action::OpenLong),
            Some(Cross::Below) => (Side::Sell, Action::OpenShort),
            None => return Ok(Action::Wait),
        };
        let handle = self
            .ctx
            .controller
            .submit(&self.exchange, OrderSpec::market(&self.symbol, side, self.quantity))
            .await?;
        info!(
            "[{}] {} price crossed {}, market {} {} ({})",
            self.exchange,
            self.symbol,
            self.signal.name(),
            side,
            self.quantity,
            handle.order_id
        );
        Ok(action)
    }

    async fn manage(&mut self, view: &PositionView, price: Price) -> Result<Action> {
        let pnl = view.pnl_at(price);
        // Either the local mark or the venue-reported figure can trip the limit
        if pnl < -self.config.loss_limit || view.unrealized_pnl < -self.config.loss_limit {
            return self
                .ctx
                .force_close(&self.exchange, view, price, "loss limit breached")
                .await;
        }
        let Some(stop_side) = view.close_side() else {
            return Ok(Action::Hold);
        };

        let open = self.ctx.open_orders(&self.exchange, &self.symbol).await?;
        let stop = open
            .iter()
            .find(|o| o.category == OrderCategory::Stop && o.side == stop_side)
            .cloned();
        let has_trailing = open
            .iter()
            .any(|o| o.category == OrderCategory::TrailingStop && o.side == stop_side);

        let target = if pnl > self.config.profit_lock_trigger {
            Some(self.profit_stop_price(view, stop_side))
        } else if stop.is_none() {
            Some(self.loss_stop_price(view, stop_side))
        } else {
            None
        };
        if let Some(target) = target {
            self.maintain_stop(view, stop_side, stop.as_ref(), target, price).await?;
        }

        if !has_trailing {
            let activation = self.trailing_activation(view, stop_side);
            let spec = OrderSpec::trailing_stop(
                &self.symbol,
                stop_side,
                view.quantity,
                activation,
                self.config.trailing_callback_rate,
            );
            self.place(spec).await?;
            info!(
                "[{}] {} trailing stop {} activates at {} ({}%)",
                self.exchange, self.symbol, stop_side, activation, self.config.trailing_callback_rate
            );
        }
        Ok(Action::Hold)
    }

    async fn maintain_stop(
        &self,
        view: &PositionView,
        side: Side,
        current: Option<&OpenOrder>,
        target: Price,
        price: Price,
    ) -> Result<()> {
        if let Some(order) = current {
            let at = order.stop_price.unwrap_or_default();
            if (at - target).abs() <= self.config.stop_tolerance {
                return Ok(());
            }
            self.ctx
                .controller
                .cancel_order(&self.exchange, &self.symbol, &order.order_id)
                .await?;
            info!("[{}] {} moving stop {} -> {}", self.exchange, self.symbol, at, target);
        }

        // A stop already through the market would fire immediately
        let through = match side {
            Side::Sell => target >= price,
            Side::Buy => target <= price,
        };
        if through {
            warn!(
                "[{}] {} skipping {} stop at {}: last price {} is already through it",
                self.exchange, self.symbol, side, target, price
            );
            return Ok(());
        }

        self.place(OrderSpec::stop(&self.symbol, side, view.quantity, target)).await?;
        info!("[{}] {} stop {} at {}", self.exchange, self.symbol, side, target);
        Ok(())
    }

    /// Submit, treating an in-flight order of the same category as done
    async fn place(&self, spec: OrderSpec) -> Result<()> {
        match self.ctx.controller.submit(&self.exchange, spec).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_benign() => {
                debug!("[{}] {} {}", self.exchange, self.symbol, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StrategyEngine for TrendEngine {
    fn name(&self) -> &str {
        "trend"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn venues(&self) -> Vec<ExchangeId> {
        vec![self.exchange.clone()]
    }

    async fn tick(&mut self) -> Result<Action> {
        let price = self.ctx.last_price(&self.exchange)?;
        let view = self.ctx.position(&self.exchange, &self.symbol);

        let action = if view.is_open() {
            self.manage(&view, price).await
        } else {
            self.open(price).await
        };
        self.previous_price = Some(price);
        action
    }

    fn reset(&mut self) {
        self.previous_price = None;
    }
}
