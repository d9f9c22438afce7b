//! Engine scenarios
//!
//! Each engine runs against paper venues wired to a real controller,
//! reconciler and recovery. The cache is fed directly, the way the event
//! dispatcher would, and positions are reconciled before every tick the way
//! the decision loop does.

use std::sync::Arc;

use argus_core::{
    BookLevel, ExchangeId, Kline, OpenOrder, OrderBookSnapshot, OrderCategory, OrderStatus, Side, Ticker, TimeInForce,
};
use argus_gateway::{MarketStateCache, PaperExchange, StateValue};
use argus_order_manager::{
    ControllerConfig, FailureRecovery, OrderLifecycleController, PositionReconciler, StateJournal, VenueRegistry,
};
use argus_ports::ExchangeClient;
use argus_strategy::{
    Action, ArbitrageConfig, ArbitrageEngine, EngineContext, MakerConfig, MakerEngine, SmaCrossSignal,
    StrategyEngine, StrategyError, TrendConfig, TrendEngine,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SYMBOL: &str = "BTCUSDT";

struct Harness {
    venues: Vec<Arc<PaperExchange>>,
    ctx: EngineContext,
}

impl Harness {
    fn new(ids: &[&str]) -> Self {
        let _ = env_logger::try_init();

        let venues: Vec<Arc<PaperExchange>> = ids.iter().map(|id| Arc::new(PaperExchange::new(*id))).collect();
        let clients: Vec<Arc<dyn ExchangeClient>> =
            venues.iter().map(|v| v.clone() as Arc<dyn ExchangeClient>).collect();
        let registry = VenueRegistry::new(clients);

        let journal = Arc::new(StateJournal::in_memory());
        let controller = Arc::new(
            OrderLifecycleController::new(registry.clone(), ControllerConfig::default()).with_journal(journal.clone()),
        );
        let reconciler = Arc::new(PositionReconciler::new(registry).with_journal(journal.clone()));
        let recovery = Arc::new(FailureRecovery::new(controller.clone(), reconciler.clone()));

        Self {
            venues,
            ctx: EngineContext {
                cache: MarketStateCache::new(),
                controller,
                reconciler,
                recovery,
                journal,
            },
        }
    }

    fn venue(&self, index: usize) -> &Arc<PaperExchange> {
        &self.venues[index]
    }

    fn id(&self, index: usize) -> ExchangeId {
        self.venues[index].id().clone()
    }

    /// Move the venue's book and mirror it into the cache
    async fn set_book(&self, index: usize, bid: Decimal, ask: Decimal) {
        let book = OrderBookSnapshot {
            symbol: SYMBOL.into(),
            bids: vec![BookLevel::new(bid, dec!(10))],
            asks: vec![BookLevel::new(ask, dec!(10))],
            timestamp: Utc::now(),
        };
        self.venues[index].set_book(book.clone()).await;
        self.ctx.cache.update(&self.id(index), StateValue::OrderBook(Arc::new(book)));
    }

    /// Cache-only ticker; the venue's book is left where it is
    fn set_price(&self, index: usize, price: Decimal) {
        let ticker = Ticker {
            symbol: SYMBOL.into(),
            last_price: price,
            timestamp: Utc::now(),
        };
        self.ctx.cache.update(&self.id(index), StateValue::Ticker(Arc::new(ticker)));
    }

    fn set_closes(&self, index: usize, closes: &[Decimal]) {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        let klines = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Kline {
                open_time: start + Duration::minutes(i as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: dec!(1),
                closed: true,
            })
            .collect();
        self.ctx.cache.update(&self.id(index), StateValue::Klines(Arc::new(klines)));
    }

    async fn reconcile(&self) {
        for venue in &self.venues {
            self.ctx.reconciler.reconcile(venue.id(), SYMBOL).await.unwrap();
        }
    }

    fn trade_count(&self) -> u64 {
        self.ctx.journal.snapshot().trade_count
    }
}

fn fast_fills() -> ArbitrageConfig {
    ArbitrageConfig {
        fill_poll_rounds: 3,
        fill_poll_interval_ms: 10,
        ..Default::default()
    }
}

// ============================================================================
// Maker
// ============================================================================

#[tokio::test]
async fn test_maker_quotes_and_requotes_as_a_pair() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100), dec!(101)).await;
    h.reconcile().await;

    let mut engine = MakerEngine::new(h.ctx.clone(), h.id(0), SYMBOL, dec!(1), MakerConfig::default());

    assert_eq!(engine.tick().await.unwrap(), Action::Wait);
    assert_eq!(engine.quoted(), Some((dec!(100), dec!(101))));
    assert_eq!(h.venue(0).resting_orders(SYMBOL).len(), 2);

    // Same top, both quotes still working
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);
    assert_eq!(h.venue(0).submitted().len(), 2);

    h.set_book(0, dec!(100.5), dec!(101.5)).await;
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::Wait);
    assert_eq!(engine.quoted(), Some((dec!(100.5), dec!(101.5))));

    let resting = h.venue(0).resting_orders(SYMBOL);
    assert_eq!(resting.len(), 2);
    assert!(resting.iter().any(|o| o.side == Side::Buy && o.price == Some(dec!(100.5))));
    assert!(resting.iter().any(|o| o.side == Side::Sell && o.price == Some(dec!(101.5))));

    // Submissions only ever come in buy/sell pairs
    let submitted = h.venue(0).submitted();
    assert_eq!(submitted.len(), 4);
    for pair in submitted.chunks(2) {
        assert_eq!(pair[0].side, Side::Buy);
        assert_eq!(pair[1].side, Side::Sell);
        assert_eq!(pair[0].time_in_force, TimeInForce::GTX);
    }
}

#[tokio::test]
async fn test_maker_keeps_exactly_one_close_order() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100), dec!(101)).await;
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(100)).await;
    // A quote left over from before the fill
    h.venue(0).inject_open_order(OpenOrder {
        order_id: "stale-1".into(),
        symbol: SYMBOL.into(),
        side: Side::Buy,
        category: OrderCategory::Limit,
        price: Some(dec!(99)),
        stop_price: None,
        quantity: dec!(1),
        reduce_only: false,
        status: OrderStatus::New,
        created_at: Utc::now(),
        updated_at: None,
    });
    h.reconcile().await;

    let mut engine = MakerEngine::new(h.ctx.clone(), h.id(0), SYMBOL, dec!(1), MakerConfig::default());
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);

    let resting = h.venue(0).resting_orders(SYMBOL);
    assert_eq!(resting.len(), 1);
    let close = &resting[0];
    assert_eq!(close.side, Side::Sell);
    assert_eq!(close.price, Some(dec!(101)));
    assert!(close.reduce_only);

    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);
    assert_eq!(h.venue(0).resting_orders(SYMBOL).len(), 1);
    assert_eq!(h.venue(0).submitted().len(), 1);
}

#[tokio::test]
async fn test_maker_force_closes_past_loss_limit() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(99), dec!(100)).await;
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(100)).await;
    h.reconcile().await;

    let mut engine = MakerEngine::new(h.ctx.clone(), h.id(0), SYMBOL, dec!(1), MakerConfig::default());
    assert_eq!(engine.tick().await.unwrap(), Action::CloseLong);

    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert_eq!(h.trade_count(), 1);
    assert_eq!(h.ctx.journal.snapshot().cumulative_pnl, dec!(-1));
}

// ============================================================================
// Trend
// ============================================================================

#[tokio::test]
async fn test_trend_waits_for_klines() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100), dec!(101)).await;
    h.reconcile().await;

    let mut engine = TrendEngine::new(
        h.ctx.clone(),
        h.id(0),
        SYMBOL,
        dec!(1),
        TrendConfig::default(),
        Arc::new(SmaCrossSignal::default()),
    );
    let err = engine.tick().await.unwrap_err();
    assert!(matches!(err, StrategyError::NotReady { .. }));
    assert!(err.is_benign());
}

#[tokio::test]
async fn test_trend_opens_on_cross() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100.9), dec!(101.1)).await;
    h.set_closes(0, &[dec!(100); 30]);
    h.reconcile().await;

    let mut engine = TrendEngine::new(
        h.ctx.clone(),
        h.id(0),
        SYMBOL,
        dec!(1),
        TrendConfig::default(),
        Arc::new(SmaCrossSignal::default()),
    );

    h.set_price(0, dec!(99));
    assert_eq!(engine.tick().await.unwrap(), Action::Wait);

    h.set_price(0, dec!(101));
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::OpenLong);
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(1));
}

#[tokio::test]
async fn test_trend_force_closes_regardless_of_stop() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100), dec!(101)).await;
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(100)).await;
    h.reconcile().await;

    let config = TrendConfig {
        loss_limit: dec!(5),
        ..Default::default()
    };
    let mut engine = TrendEngine::new(
        h.ctx.clone(),
        h.id(0),
        SYMBOL,
        dec!(1),
        config,
        Arc::new(SmaCrossSignal::default()),
    );

    h.set_price(0, dec!(100));
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);
    assert!(
        h.venue(0)
            .resting_orders(SYMBOL)
            .iter()
            .any(|o| o.category == OrderCategory::Stop && o.stop_price == Some(dec!(95)))
    );

    // Last trade gaps through the stop without the book triggering it
    h.set_price(0, dec!(94));
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::CloseLong);
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert!(h.venue(0).resting_orders(SYMBOL).is_empty());
    assert_eq!(h.trade_count(), 1);
}

#[tokio::test]
async fn test_trend_force_closes_on_venue_reported_loss() {
    let h = Harness::new(&["aster"]);
    // Venue marks at mid 93.5 while the cached last trade still reads 100
    h.set_book(0, dec!(93), dec!(94)).await;
    h.set_price(0, dec!(100));
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(100)).await;
    h.reconcile().await;

    let config = TrendConfig {
        loss_limit: dec!(5),
        ..Default::default()
    };
    let mut engine = TrendEngine::new(
        h.ctx.clone(),
        h.id(0),
        SYMBOL,
        dec!(1),
        config,
        Arc::new(SmaCrossSignal::default()),
    );

    assert_eq!(engine.tick().await.unwrap(), Action::CloseLong);
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert_eq!(h.trade_count(), 1);
}

#[tokio::test]
async fn test_trend_moves_stop_into_profit() {
    let h = Harness::new(&["aster"]);
    h.set_book(0, dec!(100.1), dec!(100.3)).await;
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(100)).await;
    h.reconcile().await;

    let config = TrendConfig {
        loss_limit: dec!(5),
        profit_lock_trigger: dec!(0.1),
        profit_lock: dec!(0.05),
        trailing_profit: dec!(0.2),
        price_tick: dec!(0.01),
        ..Default::default()
    };
    let mut engine = TrendEngine::new(
        h.ctx.clone(),
        h.id(0),
        SYMBOL,
        dec!(1),
        config,
        Arc::new(SmaCrossSignal::default()),
    );

    h.set_price(0, dec!(100.05));
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);
    let resting = h.venue(0).resting_orders(SYMBOL);
    let stop = resting.iter().find(|o| o.category == OrderCategory::Stop).unwrap();
    assert_eq!(stop.stop_price, Some(dec!(95)));
    let trailing = resting.iter().find(|o| o.category == OrderCategory::TrailingStop).unwrap();
    assert_eq!(trailing.stop_price, Some(dec!(100.2)));

    h.set_price(0, dec!(100.2));
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);

    let resting = h.venue(0).resting_orders(SYMBOL);
    let stops: Vec<_> = resting.iter().filter(|o| o.category == OrderCategory::Stop).collect();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].stop_price, Some(dec!(100.05)));
    assert_eq!(resting.iter().filter(|o| o.category == OrderCategory::TrailingStop).count(), 1);
}

// ============================================================================
// Arbitrage
// ============================================================================

async fn arbitrage_harness() -> Harness {
    let h = Harness::new(&["aster", "backpack"]);
    h.set_book(0, dec!(9990), dec!(10000)).await;
    h.set_book(1, dec!(10080), dec!(10090)).await;
    h.reconcile().await;
    h
}

fn arbitrage(h: &Harness) -> ArbitrageEngine {
    ArbitrageEngine::new(h.ctx.clone(), h.id(0), h.id(1), SYMBOL, dec!(1), fast_fills()).unwrap()
}

#[tokio::test]
async fn test_arbitrage_rejects_single_venue() {
    let h = Harness::new(&["aster"]);
    let result = ArbitrageEngine::new(h.ctx.clone(), h.id(0), h.id(0), SYMBOL, dec!(1), fast_fills());
    assert!(matches!(result, Err(StrategyError::Config(_))));
}

#[tokio::test]
async fn test_arbitrage_opens_both_legs() {
    let h = arbitrage_harness().await;
    let mut engine = arbitrage(&h);

    assert_eq!(engine.tick().await.unwrap(), Action::OpenLong);
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(1));
    assert_eq!(h.venue(1).position_quantity(SYMBOL), dec!(-1));

    // Polled fills released both leg locks
    assert!(!h.ctx.controller.is_locked(&h.id(0), SYMBOL, OrderCategory::Limit));
    assert!(!h.ctx.controller.is_locked(&h.id(1), SYMBOL, OrderCategory::Limit));
}

#[tokio::test]
async fn test_arbitrage_waits_below_threshold() {
    let h = Harness::new(&["aster", "backpack"]);
    h.set_book(0, dec!(9990), dec!(10000)).await;
    h.set_book(1, dec!(10070), dec!(10080)).await;
    h.reconcile().await;

    let mut engine = arbitrage(&h);
    assert_eq!(engine.tick().await.unwrap(), Action::Wait);
    assert!(h.venue(0).submitted().is_empty());
    assert!(h.venue(1).submitted().is_empty());
}

#[tokio::test]
async fn test_arbitrage_second_leg_failure_flattens_first() {
    let h = arbitrage_harness().await;
    h.venue(1).fail_next_creates(1);
    let mut engine = arbitrage(&h);

    let err = engine.tick().await.unwrap_err();
    assert!(matches!(err, StrategyError::LegAborted(_)));

    // Leg A was closed within the same tick
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert_eq!(h.venue(1).position_quantity(SYMBOL), dec!(0));
    assert!(!h.ctx.reconciler.view(&h.id(0), SYMBOL).is_open());
}

#[tokio::test]
async fn test_arbitrage_unfilled_first_leg_skips_second() {
    let h = arbitrage_harness().await;
    h.venue(0).set_refuse_fills(true);
    let mut engine = arbitrage(&h);

    let err = engine.tick().await.unwrap_err();
    assert!(matches!(err, StrategyError::LegAborted(_)));
    assert!(h.venue(1).submitted().is_empty());
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
}

#[tokio::test]
async fn test_arbitrage_holds_then_closes_on_revert() {
    let h = arbitrage_harness().await;
    let mut engine = arbitrage(&h);
    assert_eq!(engine.tick().await.unwrap(), Action::OpenLong);

    // Spread unchanged, legs' pnl balanced
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::Hold);

    h.set_book(0, dec!(10040), dec!(10050)).await;
    h.set_book(1, dec!(10048), dec!(10058)).await;
    h.reconcile().await;
    assert_eq!(engine.tick().await.unwrap(), Action::CloseLong);

    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert_eq!(h.venue(1).position_quantity(SYMBOL), dec!(0));
    let journal = h.ctx.journal.snapshot();
    assert_eq!(journal.trade_count, 1);
    assert_eq!(journal.cumulative_pnl, dec!(62));
}

#[tokio::test]
async fn test_arbitrage_single_open_leg_goes_to_recovery() {
    let h = arbitrage_harness().await;
    h.venue(0).set_position(SYMBOL, dec!(1), dec!(10000)).await;
    h.reconcile().await;

    let mut engine = arbitrage(&h);
    let err = engine.tick().await.unwrap_err();
    assert!(matches!(err, StrategyError::LegAborted(_)));
    assert_eq!(h.venue(0).position_quantity(SYMBOL), dec!(0));
    assert!(h.venue(1).submitted().is_empty());
}
