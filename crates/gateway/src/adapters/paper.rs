//! Paper exchange
//!
//! In-memory venue implementing [`ExchangeClient`]. Market orders fill at the
//! top of book, limit orders cross or rest, stops trigger when the book moves
//! through them. Trailing stops rest but are never triggered.
//!
//! Fault injection hooks (`fail_next_creates`, `set_refuse_fills`,
//! `fail_next_watches`, `disconnect`) let tests drive the failure paths of
//! the coordination core.
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! await; push events are collected under the lock and published after it is
//! released.

use std::collections::HashMap;

use argus_core::{
    AccountSnapshot, Balance, ExchangeId, Kline, OpenOrder, OrderBookSnapshot, OrderCategory, OrderHandle,
    OrderId, OrderSpec, OrderStatus, OrderUpdate, PositionSnapshot, Price, PushEvent, Quantity, Side, Symbol,
    Ticker, TimeInForce, Timestamp,
};
use argus_ports::{EventSink, ExchangeClient, ExchangeError, ExchangeResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::watch;
use uuid::Uuid;

use crate::feed::StreamKind;

/// Venue API credentials. Opaque to everything but the adapter.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn has_secret(&self) -> bool {
        !self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_creates: u32,
    fail_cancels: u32,
    fail_watches: u32,
    refuse_fills: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Holding {
    /// Signed, negative for short
    quantity: Quantity,
    entry_price: Price,
}

struct Subscription {
    stream: StreamKind,
    symbol: Option<Symbol>,
    sink: EventSink,
}

#[derive(Default)]
struct PaperState {
    books: HashMap<Symbol, OrderBookSnapshot>,
    last_price: HashMap<Symbol, Price>,
    klines: HashMap<Symbol, Vec<Kline>>,
    holdings: HashMap<Symbol, Holding>,
    resting: Vec<OpenOrder>,
    history: HashMap<OrderId, OrderUpdate>,
    submitted: Vec<OrderSpec>,
    leverage: HashMap<Symbol, u32>,
    cash: Decimal,
    next_id: u64,
    last_created: Option<Timestamp>,
    faults: Faults,
}

/// Events produced by one state mutation, routed after the lock is dropped
type Outbox = Vec<(StreamKind, Option<Symbol>, PushEvent)>;

impl PaperState {
    fn next_order_id(&mut self, exchange: &ExchangeId) -> OrderId {
        self.next_id += 1;
        format!("{}-{}", exchange, self.next_id)
    }

    /// Wall-clock time, strictly increasing per venue so creation order is
    /// always recoverable from timestamps
    fn stamp(&mut self) -> Timestamp {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn mark_price(&self, symbol: &str) -> Option<Price> {
        self.books
            .get(symbol)
            .and_then(|b| b.mid_price())
            .or_else(|| self.last_price.get(symbol).copied())
    }

    fn positions(&self) -> Vec<PositionSnapshot> {
        let mut out: Vec<_> = self
            .holdings
            .iter()
            .filter(|(_, h)| !h.quantity.is_zero())
            .map(|(symbol, h)| {
                let mark = self.mark_price(symbol).unwrap_or(h.entry_price);
                PositionSnapshot {
                    symbol: symbol.clone(),
                    quantity: h.quantity,
                    entry_price: h.entry_price,
                    unrealized_pnl: (mark - h.entry_price) * h.quantity,
                }
            })
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    fn account(&self) -> AccountSnapshot {
        AccountSnapshot {
            balances: vec![Balance {
                asset: QUOTE_ASSET.to_string(),
                free: self.cash,
                locked: Decimal::ZERO,
            }],
            positions: self.positions(),
            timestamp: Utc::now(),
        }
    }

    fn open_orders(&self, symbol: &str) -> Vec<OpenOrder> {
        self.resting
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    fn holding(&self, symbol: &str) -> Holding {
        self.holdings.get(symbol).copied().unwrap_or_default()
    }

    /// Quantity a reduce-only order may still execute
    fn reducible(&self, symbol: &str, side: Side) -> Quantity {
        let q = self.holding(symbol).quantity;
        match side {
            Side::Sell if q > Decimal::ZERO => q,
            Side::Buy if q < Decimal::ZERO => -q,
            _ => Decimal::ZERO,
        }
    }

    /// Apply a fill to the holding; returns realized pnl
    fn apply_fill(&mut self, symbol: &str, side: Side, qty: Quantity, price: Price) -> Decimal {
        let mut h = self.holding(symbol);
        let delta = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };

        let mut realized = Decimal::ZERO;
        if h.quantity.is_zero() || h.quantity.is_sign_positive() == delta.is_sign_positive() {
            let new_qty = h.quantity + delta;
            h.entry_price = (h.quantity.abs() * h.entry_price + qty * price) / new_qty.abs();
            h.quantity = new_qty;
        } else {
            let closing = qty.min(h.quantity.abs());
            let direction = if h.quantity > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };
            realized = closing * (price - h.entry_price) * direction;
            let remainder = qty - closing;
            if remainder > Decimal::ZERO {
                h.quantity = if delta > Decimal::ZERO { remainder } else { -remainder };
                h.entry_price = price;
            } else {
                h.quantity += delta;
                if h.quantity.is_zero() {
                    h.entry_price = Decimal::ZERO;
                }
            }
        }

        self.holdings.insert(symbol.to_string(), h);
        self.cash += realized;
        self.last_price.insert(symbol.to_string(), price);
        realized
    }

    fn record(&mut self, order_id: &OrderId, symbol: &str, status: OrderStatus, filled: Quantity, avg: Option<Price>, out: &mut Outbox) {
        let update = OrderUpdate {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            status,
            filled_qty: filled,
            avg_price: avg,
            timestamp: Utc::now(),
        };
        self.history.insert(order_id.clone(), update.clone());
        out.push((StreamKind::OrderStatus, Some(symbol.to_string()), PushEvent::OrderUpdate(update)));
    }

    fn after_fill(&self, symbol: &str, out: &mut Outbox) {
        out.push((StreamKind::Account, None, PushEvent::Account(self.account())));
        if let Some(price) = self.last_price.get(symbol) {
            out.push((
                StreamKind::Ticker,
                Some(symbol.to_string()),
                PushEvent::Ticker(Ticker {
                    symbol: symbol.to_string(),
                    last_price: *price,
                    timestamp: Utc::now(),
                }),
            ));
        }
    }

    fn listing(&self, symbol: &str, out: &mut Outbox) {
        out.push((
            StreamKind::OrderStatus,
            Some(symbol.to_string()),
            PushEvent::OpenOrders {
                symbol: symbol.to_string(),
                orders: self.open_orders(symbol),
            },
        ));
    }

    /// Opposite-side top of book a taker order would hit
    fn taker_price(&self, symbol: &str, side: Side) -> Option<Price> {
        let book = self.books.get(symbol)?;
        match side {
            Side::Buy => book.best_ask(),
            Side::Sell => book.best_bid(),
        }
    }

    /// Fire resting limits and stops that the current book crosses
    fn match_resting(&mut self, symbol: &str, out: &mut Outbox) {
        if self.faults.refuse_fills {
            return;
        }
        let Some((bid, ask)) = self.books.get(symbol).and_then(|b| b.top()) else {
            return;
        };

        let mut fired = Vec::new();
        self.resting.retain(|o| {
            if o.symbol != symbol {
                return true;
            }
            let hit = match (o.category, o.side) {
                (OrderCategory::Limit, Side::Buy) => o.price.is_some_and(|p| ask <= p),
                (OrderCategory::Limit, Side::Sell) => o.price.is_some_and(|p| bid >= p),
                (OrderCategory::Stop, Side::Sell) => o.stop_price.is_some_and(|p| bid <= p),
                (OrderCategory::Stop, Side::Buy) => o.stop_price.is_some_and(|p| ask >= p),
                _ => false,
            };
            if hit {
                fired.push(o.clone());
            }
            !hit
        });

        for order in fired {
            let price = match order.category {
                OrderCategory::Limit => order.price.unwrap_or(if order.side == Side::Buy { ask } else { bid }),
                _ => if order.side == Side::Buy { ask } else { bid },
            };
            let qty = if order.reduce_only {
                order.quantity.min(self.reducible(symbol, order.side))
            } else {
                order.quantity
            };
            if qty.is_zero() {
                self.record(&order.order_id, symbol, OrderStatus::Expired, Decimal::ZERO, None, out);
                continue;
            }
            self.apply_fill(symbol, order.side, qty, price);
            self.record(&order.order_id, symbol, OrderStatus::Filled, qty, Some(price), out);
            debug!("paper {} {} {} {} @ {} triggered", order.order_id, order.category, order.side, qty, price);
            self.after_fill(symbol, out);
        }
    }
}

/// In-memory exchange
pub struct PaperExchange {
    id: ExchangeId,
    credentials: Option<Credentials>,
    state: Mutex<PaperState>,
    subscriptions: Mutex<Vec<Subscription>>,
    disconnect: watch::Sender<u64>,
}

impl PaperExchange {
    pub fn new(id: impl Into<ExchangeId>) -> Self {
        let (disconnect, _) = watch::channel(0);
        Self {
            id: id.into(),
            credentials: None,
            state: Mutex::new(PaperState {
                cash: Decimal::from(10_000),
                ..Default::default()
            }),
            subscriptions: Mutex::new(Vec::new()),
            disconnect,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    // ------------------------------------------------------------------
    // Market simulation
    // ------------------------------------------------------------------

    /// Replace the book, fire crossed resting orders, publish
    pub async fn set_book(&self, book: OrderBookSnapshot) {
        let mut out = Outbox::new();
        {
            let mut state = self.state.lock();
            let symbol = book.symbol.clone();
            out.push((StreamKind::OrderBook, Some(symbol.clone()), PushEvent::OrderBook(book.clone())));
            state.books.insert(symbol.clone(), book);
            let before = state.resting.len();
            state.match_resting(&symbol, &mut out);
            if state.resting.len() != before {
                state.listing(&symbol, &mut out);
            }
        }
        self.route(out).await;
    }

    pub async fn set_last_price(&self, symbol: &str, price: Price) {
        let out = {
            let mut state = self.state.lock();
            state.last_price.insert(symbol.to_string(), price);
            let mut out = Outbox::new();
            out.push((
                StreamKind::Ticker,
                Some(symbol.to_string()),
                PushEvent::Ticker(Ticker {
                    symbol: symbol.to_string(),
                    last_price: price,
                    timestamp: Utc::now(),
                }),
            ));
            out
        };
        self.route(out).await;
    }

    pub async fn set_klines(&self, symbol: &str, klines: Vec<Kline>) {
        let out = {
            let mut state = self.state.lock();
            state.klines.insert(symbol.to_string(), klines.clone());
            vec![(
                StreamKind::Klines,
                Some(symbol.to_string()),
                PushEvent::Klines {
                    symbol: symbol.to_string(),
                    klines,
                },
            )]
        };
        self.route(out).await;
    }

    /// Force a holding, as if opened outside this process. Zero clears it.
    pub async fn set_position(&self, symbol: &str, quantity: Quantity, entry_price: Price) {
        let out = {
            let mut state = self.state.lock();
            state.holdings.insert(symbol.to_string(), Holding { quantity, entry_price });
            vec![(StreamKind::Account, None, PushEvent::Account(state.account()))]
        };
        self.route(out).await;
    }

    /// Place a resting order directly, bypassing submission (duplicates
    /// left over from a reconnect, say)
    pub fn inject_open_order(&self, order: OpenOrder) {
        let mut state = self.state.lock();
        state.history.insert(
            order.order_id.clone(),
            OrderUpdate {
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
                status: order.status,
                filled_qty: Decimal::ZERO,
                avg_price: None,
                timestamp: order.recency(),
            },
        );
        state.resting.push(order);
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// The next `n` order submissions fail with a network error
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().faults.fail_creates = n;
    }

    pub fn fail_next_cancels(&self, n: u32) {
        self.state.lock().faults.fail_cancels = n;
    }

    /// The next `n` subscription attempts are dropped immediately
    pub fn fail_next_watches(&self, n: u32) {
        self.state.lock().faults.fail_watches = n;
    }

    /// Marketable orders expire instead of filling; resting orders never fill
    pub fn set_refuse_fills(&self, refuse: bool) {
        self.state.lock().faults.refuse_fills = refuse;
    }

    /// Drop every live subscription
    pub fn disconnect(&self) {
        self.subscriptions.lock().clear();
        self.disconnect.send_modify(|generation| *generation += 1);
        info!("[{}] paper venue dropped all subscriptions", self.id);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Every accepted submission, in order
    pub fn submitted(&self) -> Vec<OrderSpec> {
        self.state.lock().submitted.clone()
    }

    pub fn resting_orders(&self, symbol: &str) -> Vec<OpenOrder> {
        self.state.lock().open_orders(symbol)
    }

    /// Signed position quantity
    pub fn position_quantity(&self, symbol: &str) -> Quantity {
        self.state.lock().holding(symbol).quantity
    }

    pub fn leverage(&self, symbol: &str) -> Option<u32> {
        self.state.lock().leverage.get(symbol).copied()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    // ------------------------------------------------------------------

    async fn route(&self, out: Outbox) {
        if out.is_empty() {
            return;
        }
        for (stream, symbol, event) in out {
            let sinks: Vec<EventSink> = {
                let mut subs = self.subscriptions.lock();
                subs.retain(|s| !s.sink.is_closed());
                subs.iter()
                    .filter(|s| s.stream == stream && (s.symbol.is_none() || s.symbol == symbol))
                    .map(|s| s.sink.clone())
                    .collect()
            };
            for sink in sinks {
                // A closed sink is pruned on the next route
                let _ = sink.publish(event.clone()).await;
            }
        }
    }

    async fn subscribe(
        &self,
        stream: StreamKind,
        symbol: Option<&str>,
        sink: EventSink,
        initial: Vec<PushEvent>,
    ) -> ExchangeResult<()> {
        {
            let mut state = self.state.lock();
            if state.faults.fail_watches > 0 {
                state.faults.fail_watches -= 1;
                return Err(ExchangeError::Disconnected(format!("[{}] injected {} drop", self.id, stream)));
            }
        }

        let mut dropped = self.disconnect.subscribe();
        for event in initial {
            sink.publish(event).await?;
        }
        self.subscriptions.lock().push(Subscription {
            stream,
            symbol: symbol.map(str::to_string),
            sink: sink.clone(),
        });

        tokio::select! {
            _ = dropped.changed() => Err(ExchangeError::Disconnected(format!("[{}] {} stream dropped", self.id, stream))),
            _ = sink.closed() => Ok(()),
        }
    }

    fn validate(&self, state: &PaperState, spec: &OrderSpec) -> ExchangeResult<()> {
        if spec.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected(format!("invalid quantity {}", spec.quantity)));
        }
        match spec.category {
            OrderCategory::Limit if spec.price.is_none() => {
                return Err(ExchangeError::Rejected("limit order without price".into()));
            }
            OrderCategory::Stop | OrderCategory::TrailingStop if spec.stop_price.is_none() => {
                return Err(ExchangeError::Rejected(format!("{} order without stop price", spec.category)));
            }
            _ => {}
        }
        if spec.reduce_only && state.reducible(&spec.symbol, spec.side).is_zero() {
            return Err(ExchangeError::Rejected("reduce-only order would not reduce position".into()));
        }
        if spec.category == OrderCategory::Stop {
            if let (Some(stop), Some(last)) = (spec.stop_price, state.last_price.get(&spec.symbol)) {
                let immediate = match spec.side {
                    Side::Sell => stop >= *last,
                    Side::Buy => stop <= *last,
                };
                if immediate {
                    return Err(ExchangeError::Rejected(format!("stop {} would immediately trigger", stop)));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot> {
        let state = self.state.lock();
        state
            .books
            .get(symbol)
            .cloned()
            .map(|b| b.truncated(depth))
            .ok_or_else(|| ExchangeError::NotFound(format!("no book for {}", symbol)))
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let state = self.state.lock();
        let last_price = state
            .last_price
            .get(symbol)
            .copied()
            .or_else(|| state.mark_price(symbol))
            .ok_or_else(|| ExchangeError::NotFound(format!("no price for {}", symbol)))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price,
            timestamp: Utc::now(),
        })
    }

    async fn get_klines(&self, symbol: &str, limit: usize) -> ExchangeResult<Vec<Kline>> {
        let state = self.state.lock();
        let klines = state.klines.get(symbol).cloned().unwrap_or_default();
        let skip = klines.len().saturating_sub(limit);
        Ok(klines.into_iter().skip(skip).collect())
    }

    async fn get_account(&self) -> ExchangeResult<AccountSnapshot> {
        Ok(self.state.lock().account())
    }

    async fn get_positions(&self) -> ExchangeResult<Vec<PositionSnapshot>> {
        Ok(self.state.lock().positions())
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        Ok(self.state.lock().open_orders(symbol))
    }

    async fn create_order(&self, spec: &OrderSpec) -> ExchangeResult<OrderHandle> {
        let mut out = Outbox::new();
        let handle = {
            let mut state = self.state.lock();
            if state.faults.fail_creates > 0 {
                state.faults.fail_creates -= 1;
                return Err(ExchangeError::Network(format!("[{}] injected submission failure", self.id)));
            }
            self.validate(&state, spec)?;

            let order_id = state.next_order_id(&self.id);
            let created_at = state.stamp();
            let symbol = spec.symbol.as_str();
            let refuse = state.faults.refuse_fills;
            let taker = state.taker_price(symbol, spec.side);

            let crosses = match (spec.category, spec.price, taker) {
                (OrderCategory::Market, _, Some(_)) => true,
                (OrderCategory::Limit, Some(limit), Some(top)) => match spec.side {
                    Side::Buy => top <= limit,
                    Side::Sell => top >= limit,
                },
                _ => false,
            };

            enum Outcome {
                Fill(Price),
                Rest,
                Expire,
            }
            let outcome = match spec.category {
                OrderCategory::Market => match taker {
                    _ if refuse => Outcome::Expire,
                    Some(price) => Outcome::Fill(price),
                    None => return Err(ExchangeError::Rejected(format!("no liquidity for {}", symbol))),
                },
                OrderCategory::Limit => match spec.time_in_force {
                    TimeInForce::GTX if crosses => Outcome::Expire,
                    TimeInForce::GTX => Outcome::Rest,
                    TimeInForce::FOK | TimeInForce::IOC if crosses && !refuse => {
                        Outcome::Fill(taker.unwrap_or_default())
                    }
                    TimeInForce::FOK | TimeInForce::IOC => Outcome::Expire,
                    TimeInForce::GTC if crosses && !refuse => Outcome::Fill(taker.unwrap_or_default()),
                    TimeInForce::GTC => Outcome::Rest,
                },
                OrderCategory::Stop | OrderCategory::TrailingStop => Outcome::Rest,
            };

            state.submitted.push(spec.clone());
            match outcome {
                Outcome::Fill(price) => {
                    let qty = if spec.reduce_only {
                        spec.quantity.min(state.reducible(symbol, spec.side))
                    } else {
                        spec.quantity
                    };
                    state.apply_fill(symbol, spec.side, qty, price);
                    state.record(&order_id, symbol, OrderStatus::Filled, qty, Some(price), &mut out);
                    state.after_fill(symbol, &mut out);
                }
                Outcome::Rest => {
                    state.resting.push(OpenOrder {
                        order_id: order_id.clone(),
                        symbol: symbol.to_string(),
                        side: spec.side,
                        category: spec.category,
                        price: spec.price,
                        stop_price: spec.stop_price,
                        quantity: spec.quantity,
                        reduce_only: spec.reduce_only,
                        status: OrderStatus::New,
                        created_at,
                        updated_at: None,
                    });
                    state.record(&order_id, symbol, OrderStatus::New, Decimal::ZERO, None, &mut out);
                }
                Outcome::Expire => {
                    state.record(&order_id, symbol, OrderStatus::Expired, Decimal::ZERO, None, &mut out);
                }
            }
            state.listing(symbol, &mut out);

            debug!("[{}] paper accepted {} {} {} {}", self.id, order_id, spec.category, spec.side, spec.quantity);
            OrderHandle {
                order_id,
                client_order_id: Some(Uuid::new_v4().to_string()),
                created_at,
            }
        };
        self.route(out).await;
        Ok(handle)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<()> {
        let mut out = Outbox::new();
        {
            let mut state = self.state.lock();
            if state.faults.fail_cancels > 0 {
                state.faults.fail_cancels -= 1;
                return Err(ExchangeError::Network(format!("[{}] injected cancel failure", self.id)));
            }
            let index = state
                .resting
                .iter()
                .position(|o| o.order_id == *order_id && o.symbol == symbol)
                .ok_or_else(|| ExchangeError::NotFound(format!("order {} not open", order_id)))?;
            state.resting.remove(index);
            state.record(order_id, symbol, OrderStatus::Canceled, Decimal::ZERO, None, &mut out);
            state.listing(symbol, &mut out);
        }
        self.route(out).await;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let mut out = Outbox::new();
        {
            let mut state = self.state.lock();
            if state.faults.fail_cancels > 0 {
                state.faults.fail_cancels -= 1;
                return Err(ExchangeError::Network(format!("[{}] injected cancel failure", self.id)));
            }
            let (canceled, kept): (Vec<OpenOrder>, Vec<OpenOrder>) =
                std::mem::take(&mut state.resting).into_iter().partition(|o| o.symbol == symbol);
            state.resting = kept;
            for o in &canceled {
                state.record(&o.order_id, symbol, OrderStatus::Canceled, Decimal::ZERO, None, &mut out);
            }
            state.listing(symbol, &mut out);
        }
        self.route(out).await;
        Ok(())
    }

    async fn get_order_status(&self, _symbol: &str, order_id: &OrderId) -> ExchangeResult<OrderUpdate> {
        self.state
            .lock()
            .history
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound(format!("order {} unknown", order_id)))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        if leverage == 0 {
            return Err(ExchangeError::Rejected("leverage must be positive".into()));
        }
        self.state.lock().leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn watch_order_book(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()> {
        let initial = self.state.lock().books.get(symbol).cloned().map(PushEvent::OrderBook);
        self.subscribe(StreamKind::OrderBook, Some(symbol), sink, initial.into_iter().collect())
            .await
    }

    async fn watch_ticker(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()> {
        let initial = self.state.lock().last_price.get(symbol).map(|price| {
            PushEvent::Ticker(Ticker {
                symbol: symbol.to_string(),
                last_price: *price,
                timestamp: Utc::now(),
            })
        });
        self.subscribe(StreamKind::Ticker, Some(symbol), sink, initial.into_iter().collect())
            .await
    }

    async fn watch_klines(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()> {
        let initial = self.state.lock().klines.get(symbol).cloned().map(|klines| PushEvent::Klines {
            symbol: symbol.to_string(),
            klines,
        });
        self.subscribe(StreamKind::Klines, Some(symbol), sink, initial.into_iter().collect())
            .await
    }

    async fn watch_account(&self, sink: EventSink) -> ExchangeResult<()> {
        let initial = PushEvent::Account(self.state.lock().account());
        self.subscribe(StreamKind::Account, None, sink, vec![initial]).await
    }

    async fn watch_order_status(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()> {
        let initial = PushEvent::OpenOrders {
            symbol: symbol.to_string(),
            orders: self.state.lock().open_orders(symbol),
        };
        self.subscribe(StreamKind::OrderStatus, Some(symbol), sink, vec![initial]).await
    }
}
