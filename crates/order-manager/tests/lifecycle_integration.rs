//! Order lifecycle integration tests
//!
//! Run the controller, dispatcher and reaper together against the paper venue:
//! 1. Locks are released by deadline even with zero pushes
//! 2. A fill pushed through the event channel releases the lock
//! 3. Dedup keeps only the newest resting order
//! 4. Every acknowledged cancel lands in the journal
//! 5. Recovery flattens, cancels and resets

use std::sync::Arc;
use std::time::Duration;

use argus_core::{
    BookLevel, ExchangeId, OpenOrder, OrderBookSnapshot, OrderCategory, OrderSpec, OrderStatus, Side, TimeInForce,
};
use argus_gateway::{FeedConfig, MarketStateCache, PaperExchange, StreamKind, event_channel, spawn_feeds};
use argus_order_manager::{
    ControllerConfig, EventDispatcher, FailureRecovery, OrderEvent, OrderLifecycleController, PositionReconciler,
    StateJournal, VenueRegistry,
};
use argus_ports::ExchangeClient;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SYMBOL: &str = "BTCUSDT";

fn book(bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
    OrderBookSnapshot {
        symbol: SYMBOL.into(),
        bids: vec![BookLevel::new(bid, dec!(5))],
        asks: vec![BookLevel::new(ask, dec!(5))],
        timestamp: Utc::now(),
    }
}

struct Harness {
    venue: Arc<PaperExchange>,
    exchange: ExchangeId,
    controller: Arc<OrderLifecycleController>,
    reconciler: Arc<PositionReconciler>,
    journal: Arc<StateJournal>,
}

async fn harness() -> Harness {
    let venue = Arc::new(PaperExchange::new("aster"));
    venue.set_book(book(dec!(100), dec!(101))).await;
    let exchange = venue.id().clone();

    let client: Arc<dyn ExchangeClient> = venue.clone();
    let venues = VenueRegistry::new([client]);
    let journal = Arc::new(StateJournal::in_memory());
    let controller = Arc::new(
        OrderLifecycleController::new(venues.clone(), ControllerConfig::default()).with_journal(journal.clone()),
    );
    let reconciler = Arc::new(PositionReconciler::new(venues).with_journal(journal.clone()));

    Harness {
        venue,
        exchange,
        controller,
        reconciler,
        journal,
    }
}

fn resting(id: &str, side: Side, price: Decimal, age_secs: i64) -> OpenOrder {
    OpenOrder {
        order_id: id.into(),
        symbol: SYMBOL.into(),
        side,
        category: OrderCategory::Limit,
        price: Some(price),
        stop_price: None,
        quantity: dec!(1),
        reduce_only: false,
        status: OrderStatus::New,
        created_at: Utc::now() - ChronoDuration::seconds(age_secs),
        updated_at: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_lock_released_by_deadline_without_pushes() {
    let _ = env_logger::try_init();
    let h = harness().await;
    let reaper = h.controller.spawn_reaper();

    let spec = OrderSpec::limit(SYMBOL, Side::Buy, dec!(1), dec!(99), TimeInForce::GTX);
    h.controller.submit(&h.exchange, spec.clone()).await.unwrap();
    assert!(h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert!(h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));

    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert!(!h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));
    assert_eq!(h.controller.locked_count(), 0);

    // The category is usable again
    let again = OrderSpec::limit(SYMBOL, Side::Buy, dec!(1), dec!(98), TimeInForce::GTX);
    assert!(h.controller.submit(&h.exchange, again).await.is_ok());

    reaper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_fill_push_releases_lock_through_dispatcher() {
    let _ = env_logger::try_init();
    let h = harness().await;

    let (tx, rx) = event_channel(64);
    let config = FeedConfig {
        streams: vec![StreamKind::OrderStatus, StreamKind::OrderBook],
        ..Default::default()
    };
    let client: Arc<dyn ExchangeClient> = h.venue.clone();
    let mut feeds = spawn_feeds(&[client], SYMBOL, &tx, &config);
    drop(tx);

    let cache = MarketStateCache::new();
    let dispatcher = tokio::spawn(EventDispatcher::new(cache.clone(), h.controller.clone()).run(rx));
    while h.venue.subscriber_count() < 2 {
        tokio::task::yield_now().await;
    }

    let spec = OrderSpec::limit(SYMBOL, Side::Buy, dec!(1), dec!(100), TimeInForce::GTX);
    h.controller.submit(&h.exchange, spec).await.unwrap();
    assert!(h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));

    // Book trades through the bid; the resting buy fills and the push lands
    h.venue.set_book(book(dec!(99), dec!(100))).await;
    for _ in 0..50 {
        if !h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));
    assert_eq!(cache.order_book(&h.exchange).available().unwrap().top(), Some((dec!(99), dec!(100))));

    feeds.abort_all();
    while feeds.next_exit().await.is_some() {}
    // The venue still holds its subscription sinks until they are dropped
    h.venue.disconnect();
    assert!(dispatcher.await.unwrap() > 0);
}

#[tokio::test]
async fn test_deduplicate_keeps_newest() {
    let _ = env_logger::try_init();
    let h = harness().await;

    h.venue.inject_open_order(resting("old", Side::Buy, dec!(97), 30));
    h.venue.inject_open_order(resting("newest", Side::Buy, dec!(99), 1));
    h.venue.inject_open_order(resting("middle", Side::Buy, dec!(98), 10));
    h.venue.inject_open_order(resting("other-side", Side::Sell, dec!(105), 20));

    let mut canceled = h
        .controller
        .deduplicate(&h.exchange, SYMBOL, OrderCategory::Limit, Side::Buy)
        .await
        .unwrap();
    canceled.sort();
    assert_eq!(canceled, vec!["middle".to_string(), "old".to_string()]);

    let left: Vec<String> = h.venue.resting_orders(SYMBOL).into_iter().map(|o| o.order_id).collect();
    assert_eq!(left, vec!["newest".to_string(), "other-side".to_string()]);

    // A single survivor needs nothing
    let none = h
        .controller
        .deduplicate(&h.exchange, SYMBOL, OrderCategory::Limit, Side::Buy)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_cancel_ack_releases_lock() {
    let h = harness().await;
    let spec = OrderSpec::limit(SYMBOL, Side::Sell, dec!(1), dec!(103), TimeInForce::GTX);
    let handle = h.controller.submit(&h.exchange, spec).await.unwrap();

    h.controller.cancel_order(&h.exchange, SYMBOL, &handle.order_id).await.unwrap();
    assert!(!h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Limit));
    assert!(h.venue.resting_orders(SYMBOL).is_empty());

    // Canceling again is not an error
    h.controller.cancel_order(&h.exchange, SYMBOL, &handle.order_id).await.unwrap();
}

#[tokio::test]
async fn test_submissions_are_journaled() {
    let h = harness().await;
    h.controller
        .submit(&h.exchange, OrderSpec::market(SYMBOL, Side::Buy, dec!(0.5)))
        .await
        .unwrap();
    h.venue.fail_next_creates(1);
    let stop = OrderSpec::stop(SYMBOL, Side::Sell, dec!(0.5), dec!(90));
    assert!(h.controller.submit(&h.exchange, stop).await.is_err());

    let events: Vec<OrderEvent> = h.journal.snapshot().orders.iter().map(|o| o.event).collect();
    assert_eq!(events, vec![OrderEvent::Submitted, OrderEvent::Rejected]);
}

#[tokio::test]
async fn test_cancellations_are_journaled() {
    let h = harness().await;
    let spec = OrderSpec::limit(SYMBOL, Side::Buy, dec!(1), dec!(99), TimeInForce::GTX);
    let handle = h.controller.submit(&h.exchange, spec).await.unwrap();
    h.controller.cancel_order(&h.exchange, SYMBOL, &handle.order_id).await.unwrap();
    // A repeated cancel is not a second state change
    h.controller.cancel_order(&h.exchange, SYMBOL, &handle.order_id).await.unwrap();

    h.venue.inject_open_order(resting("dup-old", Side::Buy, dec!(97), 30));
    h.venue.inject_open_order(resting("dup-new", Side::Buy, dec!(98), 1));
    h.controller
        .deduplicate(&h.exchange, SYMBOL, OrderCategory::Limit, Side::Buy)
        .await
        .unwrap();
    h.controller.cancel_all(&h.exchange, SYMBOL).await.unwrap();

    let orders = h.journal.snapshot().orders;
    let events: Vec<(OrderEvent, Option<String>)> = orders.iter().map(|o| (o.event, o.order_id.clone())).collect();
    assert_eq!(
        events,
        vec![
            (OrderEvent::Submitted, Some(handle.order_id.clone())),
            (OrderEvent::Canceled, Some(handle.order_id.clone())),
            (OrderEvent::Canceled, Some("dup-old".to_string())),
            (OrderEvent::Canceled, Some("dup-new".to_string())),
        ]
    );
    assert_eq!(orders[1].price, Some(dec!(99)));
    assert_eq!(orders[3].price, Some(dec!(98)));
    assert!(h.venue.resting_orders(SYMBOL).is_empty());
}

#[tokio::test]
async fn test_recovery_flattens_and_resets() {
    let _ = env_logger::try_init();
    let h = harness().await;
    h.venue.set_position(SYMBOL, dec!(2), dec!(100)).await;
    h.reconciler.reconcile(&h.exchange, SYMBOL).await.unwrap();

    h.controller
        .submit(&h.exchange, OrderSpec::stop(SYMBOL, Side::Sell, dec!(2), dec!(95)))
        .await
        .unwrap();
    assert!(h.controller.is_locked(&h.exchange, SYMBOL, OrderCategory::Stop));

    let recovery = FailureRecovery::new(h.controller.clone(), h.reconciler.clone());
    let report = recovery
        .on_fatal(std::slice::from_ref(&h.exchange), SYMBOL, "leg B rejected")
        .await;

    assert!(report.is_clean());
    assert_eq!(report.flattened.len(), 1);
    assert_eq!(report.flattened[0].1.quantity, dec!(2));
    assert_eq!(h.venue.position_quantity(SYMBOL), dec!(0));
    assert!(h.venue.resting_orders(SYMBOL).is_empty());
    assert_eq!(h.controller.locked_count(), 0);
    assert!(!h.reconciler.view(&h.exchange, SYMBOL).is_open());
    assert!(h.journal.snapshot().positions.is_empty());
}

#[tokio::test]
async fn test_recovery_on_flat_venue_is_a_no_op() {
    let h = harness().await;
    let recovery = FailureRecovery::new(h.controller.clone(), h.reconciler.clone());

    let report = recovery.on_fatal(std::slice::from_ref(&h.exchange), SYMBOL, "tick panicked").await;
    assert!(report.is_clean());
    assert!(report.flattened.is_empty());
    assert!(h.venue.submitted().is_empty());
}
