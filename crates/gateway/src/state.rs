//! Market State Cache
//!
//! Latest-value store for everything the venues push: order books, tickers,
//! account snapshots, positions, open-order listings and klines.
//!
//! - `DashMap`: per-(exchange, kind) sharding, a write to one key never
//!   blocks a read of another
//! - `Arc` values: readers clone a pointer and never wait on a writer
//!
//! ```text
//! Push handler ──► update(ex, value) ──► replace Arc in shard
//! Strategy     ──► read(ex, kind)    ──► Arc clone (or NotYetAvailable)
//! ```
//!
//! Last write wins. Missed intermediate updates are not an error: strategies
//! act on the current state, never on history.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use argus_core::{
    AccountSnapshot, ExchangeId, Kline, OpenOrder, OrderBookSnapshot, PositionSnapshot, PushEvent, Ticker,
    VenueEvent,
};
use dashmap::DashMap;

/// What kind of state an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    OrderBook,
    Ticker,
    Account,
    Positions,
    OpenOrders,
    Klines,
}

/// A cached payload, shared immutably
#[derive(Debug, Clone)]
pub enum StateValue {
    OrderBook(Arc<OrderBookSnapshot>),
    Ticker(Arc<Ticker>),
    Account(Arc<AccountSnapshot>),
    Positions(Arc<Vec<PositionSnapshot>>),
    OpenOrders(Arc<Vec<OpenOrder>>),
    Klines(Arc<Vec<Kline>>),
}

impl StateValue {
    pub fn kind(&self) -> StateKind {
        match self {
            StateValue::OrderBook(_) => StateKind::OrderBook,
            StateValue::Ticker(_) => StateKind::Ticker,
            StateValue::Account(_) => StateKind::Account,
            StateValue::Positions(_) => StateKind::Positions,
            StateValue::OpenOrders(_) => StateKind::OpenOrders,
            StateValue::Klines(_) => StateKind::Klines,
        }
    }
}

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    Available(T),
    /// Nothing has been pushed for this key yet
    NotYetAvailable,
}

impl<T> Cached<T> {
    pub fn available(self) -> Option<T> {
        match self {
            Cached::Available(value) => Some(value),
            Cached::NotYetAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Cached::Available(_))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StateValue,
    seq: u64,
}

/// Shared, non-blocking latest-value cache. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MarketStateCache {
    entries: Arc<DashMap<(ExchangeId, StateKind), Entry>>,
    seq: Arc<AtomicU64>,
}

macro_rules! typed_read {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, exchange: &ExchangeId) -> Cached<Arc<$ty>> {
            match self.read(exchange, StateKind::$variant) {
                Cached::Available(StateValue::$variant(value)) => Cached::Available(value),
                _ => Cached::NotYetAvailable,
            }
        }
    };
}

impl MarketStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `(exchange, value.kind())`.
    ///
    /// The replacement happens inside one shard-level exclusion scope; readers
    /// see either the old or the new value, never a mix.
    pub fn update(&self, exchange: &ExchangeId, value: StateValue) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert((exchange.clone(), value.kind()), Entry { value, seq });
    }

    /// Latest value for `(exchange, kind)` or [`Cached::NotYetAvailable`]
    pub fn read(&self, exchange: &ExchangeId, kind: StateKind) -> Cached<StateValue> {
        match self.entries.get(&(exchange.clone(), kind)) {
            Some(entry) => Cached::Available(entry.value.clone()),
            None => Cached::NotYetAvailable,
        }
    }

    /// Monotonic write sequence of an entry, 0 if never written.
    /// Lets a reader tell whether anything changed since its last look.
    pub fn version(&self, exchange: &ExchangeId, kind: StateKind) -> u64 {
        self.entries.get(&(exchange.clone(), kind)).map(|e| e.seq).unwrap_or(0)
    }

    typed_read!(order_book, OrderBook, OrderBookSnapshot);
    typed_read!(ticker, Ticker, Ticker);
    typed_read!(account, Account, AccountSnapshot);
    typed_read!(positions, Positions, Vec<PositionSnapshot>);
    typed_read!(open_orders, OpenOrders, Vec<OpenOrder>);
    typed_read!(klines, Klines, Vec<Kline>);

    /// Cached position for one symbol; flat venues report no entry
    pub fn position(&self, exchange: &ExchangeId, symbol: &str) -> Cached<Option<PositionSnapshot>> {
        match self.positions(exchange) {
            Cached::Available(all) => Cached::Available(all.iter().find(|p| p.symbol == symbol).cloned()),
            Cached::NotYetAvailable => Cached::NotYetAvailable,
        }
    }

    /// Fold one push event into the cache.
    ///
    /// Single order updates carry no standalone state and are ignored here;
    /// they only matter to the order lifecycle controller.
    pub fn apply(&self, event: &VenueEvent) {
        let exchange = &event.exchange;
        match &event.event {
            PushEvent::OrderBook(book) => self.update(exchange, StateValue::OrderBook(Arc::new(book.clone()))),
            PushEvent::Ticker(ticker) => self.update(exchange, StateValue::Ticker(Arc::new(ticker.clone()))),
            PushEvent::Account(account) => {
                self.update(exchange, StateValue::Positions(Arc::new(account.positions.clone())));
                self.update(exchange, StateValue::Account(Arc::new(account.clone())));
            }
            PushEvent::OpenOrders { orders, .. } => {
                self.update(exchange, StateValue::OpenOrders(Arc::new(orders.clone())))
            }
            PushEvent::Klines { klines, .. } => self.update(exchange, StateValue::Klines(Arc::new(klines.clone()))),
            PushEvent::OrderUpdate(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::BookLevel;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn book(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: "BTCUSDT".into(),
            bids: vec![BookLevel::new(bid, dec!(1))],
            asks: vec![BookLevel::new(ask, dec!(1))],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_read_before_update_is_sentinel() {
        let cache = MarketStateCache::new();
        let aster = ExchangeId::new("aster");
        assert_eq!(cache.order_book(&aster), Cached::NotYetAvailable);
        assert_eq!(cache.version(&aster, StateKind::OrderBook), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MarketStateCache::new();
        let aster = ExchangeId::new("aster");

        cache.update(&aster, StateValue::OrderBook(Arc::new(book(dec!(100), dec!(101)))));
        let v1 = cache.version(&aster, StateKind::OrderBook);
        cache.update(&aster, StateValue::OrderBook(Arc::new(book(dec!(102), dec!(103)))));

        let latest = cache.order_book(&aster).available().unwrap();
        assert_eq!(latest.top(), Some((dec!(102), dec!(103))));
        assert!(cache.version(&aster, StateKind::OrderBook) > v1);
    }

    #[test]
    fn test_exchanges_are_isolated() {
        let cache = MarketStateCache::new();
        let aster = ExchangeId::new("aster");
        let backpack = ExchangeId::new("backpack");

        cache.update(&aster, StateValue::OrderBook(Arc::new(book(dec!(100), dec!(101)))));
        assert!(cache.order_book(&aster).is_available());
        assert!(!cache.order_book(&backpack).is_available());
    }

    #[test]
    fn test_account_push_also_fills_positions() {
        let cache = MarketStateCache::new();
        let aster = ExchangeId::new("aster");
        let event = VenueEvent::new(
            aster.clone(),
            PushEvent::Account(AccountSnapshot {
                balances: vec![],
                positions: vec![PositionSnapshot {
                    symbol: "BTCUSDT".into(),
                    quantity: dec!(-0.5),
                    entry_price: dec!(100),
                    unrealized_pnl: dec!(0),
                }],
                timestamp: Utc::now(),
            }),
        );

        cache.apply(&event);

        let position = cache.position(&aster, "BTCUSDT").available().unwrap().unwrap();
        assert_eq!(position.quantity, dec!(-0.5));
        assert_eq!(cache.position(&aster, "ETHUSDT"), Cached::Available(None));
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let cache = MarketStateCache::new();
        let aster = ExchangeId::new("aster");

        std::thread::scope(|s| {
            for i in 0..4u32 {
                let cache = cache.clone();
                let aster = aster.clone();
                s.spawn(move || {
                    for j in 0..100u32 {
                        let bid = rust_decimal::Decimal::from(i * 1000 + j);
                        cache.update(&aster, StateValue::OrderBook(Arc::new(book(bid, bid + dec!(1)))));
                        let _ = cache.order_book(&aster);
                    }
                });
            }
        });

        let (bid, ask) = cache.order_book(&aster).available().unwrap().top().unwrap();
        assert_eq!(ask - bid, dec!(1));
    }
}
