//! Arbitrage Engine
//!
//! Two venues, one symbol. Each tick reads one pair of book snapshots and
//! evaluates everything against that pair.
//!
//! ```text
//! flat:        bid_B − ask_A ≥ threshold → buy A @ ask_A, then sell B @ bid_B
//!              bid_A − ask_B ≥ threshold → sell A @ bid_A, then buy B @ ask_B
//!
//!              leg A ──submit──► await fill ──► leg B ──submit──► await fill
//!                 │ fail            │ fail          │ fail           │ fail
//!                 └─────────────────┴───────────────┴────────────────┴──► recovery
//!
//! positioned:  close both legs together when the spread has reverted below
//!              close_threshold, or when the two legs' pnl diverge by more
//!              than imbalance_limit
//! ```
//!
//! A tick that finds exactly one leg open hands both venues to recovery.

use std::time::Duration;

use argus_core::{
    ExchangeId, OrderCategory, OrderSpec, PositionDirection, PositionView, Price, Quantity, Side, Symbol, TimeInForce,
};
use argus_order_manager::FillWait;
use async_trait::async_trait;
use log::{debug, error, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::engine::{Action, EngineContext, StrategyEngine};
use crate::error::{Result, StrategyError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    /// Minimum cross-venue spread that opens a pair
    pub threshold: Decimal,
    /// Spread below which an open pair is closed
    pub close_threshold: Decimal,
    /// Maximum divergence between the two legs' pnl while held
    pub imbalance_limit: Decimal,
    pub fill_poll_rounds: u32,
    pub fill_poll_interval_ms: u64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            threshold: dec!(80),
            close_threshold: dec!(3),
            imbalance_limit: dec!(1),
            fill_poll_rounds: 20,
            fill_poll_interval_ms: 1000,
        }
    }
}

impl ArbitrageConfig {
    pub fn fill_wait(&self) -> FillWait {
        FillWait {
            rounds: self.fill_poll_rounds,
            interval: Duration::from_millis(self.fill_poll_interval_ms),
        }
    }
}

/// Top of book on both venues, read once per tick
#[derive(Debug, Clone, Copy)]
struct Quotes {
    bid_a: Price,
    ask_a: Price,
    bid_b: Price,
    ask_b: Price,
}

/// A matched pair of open legs
#[derive(Debug, Clone, Copy, PartialEq)]
struct Legs {
    /// Side taken on venue A; venue B holds the opposite
    side_a: Side,
    entry_a: Price,
    entry_b: Price,
    quantity: Quantity,
}

impl Legs {
    /// Current spread in the direction the pair was opened
    fn spread(&self, q: &Quotes) -> Decimal {
        match self.side_a {
            Side::Buy => (q.bid_b - q.ask_a).abs(),
            Side::Sell => (q.bid_a - q.ask_b).abs(),
        }
    }

    /// Estimated pnl of closing each leg now, (A, B)
    fn pnl(&self, q: &Quotes) -> (Decimal, Decimal) {
        match self.side_a {
            Side::Buy => (
                (q.bid_a - self.entry_a) * self.quantity,
                (self.entry_b - q.ask_b) * self.quantity,
            ),
            Side::Sell => (
                (self.entry_a - q.ask_a) * self.quantity,
                (q.bid_b - self.entry_b) * self.quantity,
            ),
        }
    }
}

pub struct ArbitrageEngine {
    ctx: EngineContext,
    venue_a: ExchangeId,
    venue_b: ExchangeId,
    symbol: Symbol,
    quantity: Quantity,
    config: ArbitrageConfig,
    legs: Option<Legs>,
}

impl ArbitrageEngine {
    pub fn new(
        ctx: EngineContext,
        venue_a: ExchangeId,
        venue_b: ExchangeId,
        symbol: impl Into<Symbol>,
        quantity: Quantity,
        config: ArbitrageConfig,
    ) -> Result<Self> {
        if venue_a == venue_b {
            return Err(StrategyError::Config(format!("arbitrage needs two venues, got {} twice", venue_a)));
        }
        Ok(Self {
            ctx,
            venue_a,
            venue_b,
            symbol: symbol.into(),
            quantity,
            config,
            legs: None,
        })
    }

    fn quotes(&self) -> Result<Quotes> {
        let (bid_a, ask_a) = self.ctx.top(&self.venue_a)?;
        let (bid_b, ask_b) = self.ctx.top(&self.venue_b)?;
        Ok(Quotes { bid_a, ask_a, bid_b, ask_b })
    }

    /// Flatten both venues and report the abort
    async fn abort(&mut self, reason: String) -> StrategyError {
        error!("[{}/{}] {} {}", self.venue_a, self.venue_b, self.symbol, reason);
        self.legs = None;
        let venues = [self.venue_a.clone(), self.venue_b.clone()];
        let report = self.ctx.recovery.on_fatal(&venues, &self.symbol, &reason).await;
        if !report.is_clean() {
            error!("{} recovery left {} venue(s) unresolved", self.symbol, report.failures.len());
        }
        StrategyError::LegAborted(reason)
    }

    /// Submit one FOK leg and wait for its fill
    async fn leg(&self, venue: &ExchangeId, side: Side, price: Price) -> std::result::Result<(), String> {
        let spec = OrderSpec::limit(&self.symbol, side, self.quantity, price, TimeInForce::FOK);
        let handle = self
            .ctx
            .controller
            .submit(venue, spec)
            .await
            .map_err(|e| format!("[{}] {} leg submission failed: {}", venue, side, e))?;
        self.ctx
            .controller
            .await_fill(venue, &self.symbol, &handle.order_id, self.config.fill_wait())
            .await
            .map_err(|e| format!("[{}] {} leg not filled: {}", venue, side, e))?;
        debug!("[{}] {} {} leg filled @ {}", venue, self.symbol, side, price);
        Ok(())
    }

    async fn try_open(&mut self, q: Quotes) -> Result<Action> {
        let buy_a = q.bid_b - q.ask_a;
        let sell_a = q.bid_a - q.ask_b;
        debug!("{} spreads: B-A {} / A-B {}", self.symbol, buy_a, sell_a);

        let (side_a, price_a, price_b) = if buy_a >= self.config.threshold {
            (Side::Buy, q.ask_a, q.bid_b)
        } else if sell_a >= self.config.threshold {
            (Side::Sell, q.bid_a, q.ask_b)
        } else {
            return Ok(Action::Wait);
        };
        info!(
            "{} spread {} >= {}: {} {} @ {} then {} {} @ {}",
            self.symbol,
            buy_a.max(sell_a),
            self.config.threshold,
            side_a,
            self.venue_a,
            price_a,
            side_a.opposite(),
            self.venue_b,
            price_b
        );

        let venue_a = self.venue_a.clone();
        let venue_b = self.venue_b.clone();
        for venue in [&venue_a, &venue_b] {
            if self.ctx.controller.is_locked(venue, &self.symbol, OrderCategory::Limit) {
                debug!("[{}] {} previous leg order still in flight", venue, self.symbol);
                return Ok(Action::Wait);
            }
        }
        if let Err(reason) = self.leg(&venue_a, side_a, price_a).await {
            return Err(self.abort(reason).await);
        }
        if let Err(reason) = self.leg(&venue_b, side_a.opposite(), price_b).await {
            return Err(self.abort(reason).await);
        }

        self.legs = Some(Legs {
            side_a,
            entry_a: price_a,
            entry_b: price_b,
            quantity: self.quantity,
        });
        info!("{} pair open: {} {} @ {}, {} @ {}", self.symbol, side_a, venue_a, price_a, venue_b, price_b);
        Ok(if side_a == Side::Buy { Action::OpenLong } else { Action::OpenShort })
    }

    async fn maybe_close(&mut self, legs: Legs, q: Quotes) -> Result<Action> {
        let spread = legs.spread(&q);
        let (pnl_a, pnl_b) = legs.pnl(&q);
        let imbalance = (pnl_a - pnl_b).abs();

        let reverted = spread < self.config.close_threshold;
        let diverged = imbalance > self.config.imbalance_limit;
        if !reverted && !diverged {
            debug!("{} holding pair: spread {}, pnl {} / {}", self.symbol, spread, pnl_a, pnl_b);
            return Ok(Action::Hold);
        }

        let close_a = OrderSpec::market(&self.symbol, legs.side_a.opposite(), legs.quantity).reduce_only();
        let close_b = OrderSpec::market(&self.symbol, legs.side_a, legs.quantity).reduce_only();
        let (a, b) = tokio::join!(
            self.ctx.controller.submit(&self.venue_a, close_a),
            self.ctx.controller.submit(&self.venue_b, close_b),
        );
        if let Err(e) = a.and(b) {
            return Err(self.abort(format!("closing pair failed: {}", e)).await);
        }

        let total = pnl_a + pnl_b;
        self.legs = None;
        self.ctx.journal.record_trade(total);
        info!(
            "{} pair closed ({}): spread {}, pnl {} + {} = {}",
            self.symbol,
            if diverged { "pnl imbalance" } else { "spread reverted" },
            spread,
            pnl_a,
            pnl_b,
            total
        );
        Ok(if legs.side_a == Side::Buy { Action::CloseLong } else { Action::CloseShort })
    }

    /// Rebuild leg bookkeeping from positions opened before a restart
    fn adopt(&self, a: &PositionView, b: &PositionView) -> Legs {
        Legs {
            side_a: if a.direction == PositionDirection::Short { Side::Sell } else { Side::Buy },
            entry_a: a.entry_price,
            entry_b: b.entry_price,
            quantity: a.quantity.min(b.quantity),
        }
    }
}

#[async_trait]
impl StrategyEngine for ArbitrageEngine {
    fn name(&self) -> &str {
        "arbitrage"
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn venues(&self) -> Vec<ExchangeId> {
        vec![self.venue_a.clone(), self.venue_b.clone()]
    }

    async fn tick(&mut self) -> Result<Action> {
        let quotes = self.quotes()?;
        let view_a = self.ctx.position(&self.venue_a, &self.symbol);
        let view_b = self.ctx.position(&self.venue_b, &self.symbol);

        match (view_a.is_open(), view_b.is_open()) {
            (false, false) => {
                self.legs = None;
                self.try_open(quotes).await
            }
            (true, true) => {
                let legs = match self.legs {
                    Some(legs) => legs,
                    None => {
                        let legs = self.adopt(&view_a, &view_b);
                        info!("{} adopted open pair {:?}", self.symbol, legs);
                        legs
                    }
                };
                self.legs = Some(legs);
                self.maybe_close(legs, quotes).await
            }
            (open_a, _) => {
                let (open, flat) = if open_a {
                    (&self.venue_a, &self.venue_b)
                } else {
                    (&self.venue_b, &self.venue_a)
                };
                let reason = format!("single leg open on {} with {} flat", open, flat);
                Err(self.abort(reason).await)
            }
        }
    }

    fn reset(&mut self) {
        self.legs = None;
    }
}
