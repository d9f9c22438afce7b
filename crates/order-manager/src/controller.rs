//! Order Lifecycle Controller
//!
//! Enforces at most one in-flight order per (exchange, symbol, category).
//!
//! ```text
//!            submit / submit_group
//!   IDLE ───────────────────────────► LOCKED { PendingOrder, deadline }
//!    ▲                                   │
//!    │  status push (non-NEW) for id     │
//!    │  id missing from open-orders      │
//!    │  cancel acknowledged              │
//!    │  submission failed                │
//!    └───────────────────────────────────┘
//!    └──────────── deadline expiry ──────┘   (warns, forces IDLE)
//! ```
//!
//! Every lock carries a generation number. Release paths remove the slot only
//! if the generation still matches, so a lock is released by a push or by its
//! deadline, never both, and a late deadline can never free a newer lock.
//!
//! Submissions are never retried here: a failed exchange call releases the
//! lock and surfaces the error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use argus_core::{
    ExchangeId, OpenOrder, OrderCategory, OrderHandle, OrderId, OrderSpec, OrderStatus, OrderUpdate, Side, Symbol,
};
use argus_ports::{ExchangeClient, ExchangeError};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::deadline::DeadlineWheel;
use crate::error::{Error, Result};
use crate::journal::{OrderEvent, OrderRecord, StateJournal};
use crate::venues::VenueRegistry;

/// Lock granularity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub category: OrderCategory,
}

impl LockKey {
    pub fn new(exchange: &ExchangeId, symbol: &str, category: OrderCategory) -> Self {
        Self {
            exchange: exchange.clone(),
            symbol: symbol.to_string(),
            category,
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}", self.exchange, self.symbol, self.category)
    }
}

/// The order(s) holding a lock
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub category: OrderCategory,
    /// Empty while the submission is still in flight
    pub order_ids: Vec<OrderId>,
    pub side: Side,
    pub submitted_at: Instant,
    pub deadline: Instant,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    StatusPush(OrderStatus),
    MissingFromListing,
    CancelAck,
    SubmitFailed,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bounded lifetime of a lock without a status push
    pub lock_deadline: Duration,
    /// How long an early status for a not-yet-attached order id is remembered
    pub early_status_ttl: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lock_deadline: Duration::from_secs(3),
            early_status_ttl: Duration::from_secs(30),
        }
    }
}

/// Fill-wait policy for multi-leg operations
#[derive(Debug, Clone, Copy)]
pub struct FillWait {
    pub rounds: u32,
    pub interval: Duration,
}

impl Default for FillWait {
    fn default() -> Self {
        Self {
            rounds: 20,
            interval: Duration::from_secs(1),
        }
    }
}

pub struct OrderLifecycleController {
    venues: VenueRegistry,
    slots: DashMap<LockKey, PendingOrder>,
    wheel: DeadlineWheel,
    /// Statuses pushed before the submitting call returned the order id
    early: DashMap<(ExchangeId, OrderId), (OrderStatus, Instant)>,
    generation: AtomicU64,
    config: ControllerConfig,
    journal: Option<Arc<StateJournal>>,
}

impl OrderLifecycleController {
    pub fn new(venues: VenueRegistry, config: ControllerConfig) -> Self {
        Self {
            venues,
            slots: DashMap::new(),
            wheel: DeadlineWheel::new(),
            early: DashMap::new(),
            generation: AtomicU64::new(0),
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<StateJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn venues(&self) -> &VenueRegistry {
        &self.venues
    }

    pub fn venue(&self, exchange: &ExchangeId) -> Result<&Arc<dyn ExchangeClient>> {
        self.venues.get(exchange)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ========================================================================
    // Lock state machine
    // ========================================================================

    fn acquire(&self, key: &LockKey, side: Side) -> Result<u64> {
        let now = Instant::now();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let pending = PendingOrder {
            category: key.category,
            order_ids: Vec::new(),
            side,
            submitted_at: now,
            deadline: now + self.config.lock_deadline,
            generation,
        };

        let superseded = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().deadline > now {
                    return Err(Error::AlreadyLocked {
                        exchange: key.exchange.clone(),
                        symbol: key.symbol.clone(),
                        category: key.category,
                    });
                }
                // Deadline passed but the reaper has not run yet
                let old = slot.insert(pending);
                Some(old)
            }
            Entry::Vacant(slot) => {
                slot.insert(pending);
                None
            }
        };

        if let Some(old) = superseded {
            self.wheel.cancel(key, old.generation);
            warn!(
                "{} lock deadline expired after {:?} without status push, forcing IDLE",
                key,
                now - old.submitted_at
            );
        }
        self.wheel.schedule(key.clone(), now + self.config.lock_deadline, generation);
        debug!("{} LOCKED (gen {})", key, generation);
        Ok(generation)
    }

    fn release(&self, key: &LockKey, generation: u64, reason: Release) -> bool {
        let removed = self
            .slots
            .remove_if(key, |_, pending| pending.generation == generation)
            .is_some();
        if removed {
            self.wheel.cancel(key, generation);
            debug!("{} IDLE ({:?})", key, reason);
        }
        removed
    }

    /// Record the exchange ids of a locked submission, then apply any status
    /// that was pushed for them before the call returned
    fn attach(&self, key: &LockKey, generation: u64, order_ids: &[OrderId]) {
        let attached = match self.slots.get_mut(key) {
            Some(mut pending) if pending.generation == generation => {
                pending.order_ids.extend(order_ids.iter().cloned());
                true
            }
            _ => false,
        };
        if !attached {
            warn!("{} lock released before order ids {:?} were known", key, order_ids);
            return;
        }

        for id in order_ids {
            if let Some((_, (status, _))) = self.early.remove(&(key.exchange.clone(), id.clone())) {
                if status.releases_lock() {
                    self.release(key, generation, Release::StatusPush(status));
                    return;
                }
            }
        }
    }

    /// Lock keys currently held for `(exchange, symbol)`, with their pending order
    fn held(&self, exchange: &ExchangeId, symbol: &str) -> Vec<(LockKey, PendingOrder)> {
        self.slots
            .iter()
            .filter(|e| e.key().exchange == *exchange && e.key().symbol == symbol)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn is_locked(&self, exchange: &ExchangeId, symbol: &str, category: OrderCategory) -> bool {
        self.slots.contains_key(&LockKey::new(exchange, symbol, category))
    }

    pub fn pending(&self, exchange: &ExchangeId, symbol: &str, category: OrderCategory) -> Option<PendingOrder> {
        self.slots
            .get(&LockKey::new(exchange, symbol, category))
            .map(|p| p.value().clone())
    }

    pub fn locked_count(&self) -> usize {
        self.slots.len()
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Lock the category, deduplicate resting orders, submit.
    ///
    /// Fails fast with [`Error::AlreadyLocked`] if an order of this category
    /// is already in flight. An exchange failure releases the lock before the
    /// error is returned.
    pub async fn submit(&self, exchange: &ExchangeId, spec: OrderSpec) -> Result<OrderHandle> {
        let client = self.venue(exchange)?.clone();
        let key = LockKey::new(exchange, &spec.symbol, spec.category);
        let generation = self.acquire(&key, spec.side)?;

        if spec.category.is_resting() {
            if let Err(e) = self.deduplicate(exchange, &spec.symbol, spec.category, spec.side).await {
                warn!("{} dedup before submit failed: {}", key, e);
            }
        }

        match client.create_order(&spec).await {
            Ok(handle) => {
                info!(
                    "{} submitted {} {} @ {:?} -> {}",
                    key, spec.side, spec.quantity, spec.price.or(spec.stop_price), handle.order_id
                );
                self.journal_order(exchange, &spec, Some(handle.order_id.clone()), OrderEvent::Submitted);
                self.attach(&key, generation, std::slice::from_ref(&handle.order_id));
                Ok(handle)
            }
            Err(e) => {
                self.release(&key, generation, Release::SubmitFailed);
                warn!("{} submission failed: {}", key, e);
                self.journal_order(exchange, &spec, None, OrderEvent::Rejected);
                Err(Error::exchange(exchange, e))
            }
        }
    }

    /// Place several orders of one category under a single lock.
    ///
    /// If any member fails, members already placed are canceled before the
    /// error surfaces, so a partial group never survives.
    pub async fn submit_group(&self, exchange: &ExchangeId, specs: Vec<OrderSpec>) -> Result<Vec<OrderHandle>> {
        let Some(first) = specs.first() else {
            return Err(Error::InvalidGroup("empty group".into()));
        };
        if specs.iter().any(|s| s.symbol != first.symbol || s.category != first.category) {
            return Err(Error::InvalidGroup("members must share symbol and category".into()));
        }

        let client = self.venue(exchange)?.clone();
        let key = LockKey::new(exchange, &first.symbol, first.category);
        let generation = self.acquire(&key, first.side)?;

        let mut handles: Vec<OrderHandle> = Vec::with_capacity(specs.len());
        for spec in &specs {
            match client.create_order(spec).await {
                Ok(handle) => {
                    self.journal_order(exchange, spec, Some(handle.order_id.clone()), OrderEvent::Submitted);
                    handles.push(handle);
                }
                Err(e) => {
                    warn!("{} group member {} failed: {}", key, spec.side, e);
                    self.journal_order(exchange, spec, None, OrderEvent::Rejected);
                    let placed: Vec<OrderId> = handles.iter().map(|h| h.order_id.clone()).collect();
                    if !placed.is_empty() {
                        match client.cancel_orders(&key.symbol, &placed).await {
                            Ok(()) => {
                                info!("{} rolled back partial group {:?}", key, placed);
                                for (placed_spec, handle) in specs.iter().zip(&handles) {
                                    self.journal_order(
                                        exchange,
                                        placed_spec,
                                        Some(handle.order_id.clone()),
                                        OrderEvent::Canceled,
                                    );
                                }
                            }
                            Err(cancel_err) => {
                                error!("{} failed to roll back partial group {:?}: {}", key, placed, cancel_err)
                            }
                        }
                    }
                    self.release(&key, generation, Release::SubmitFailed);
                    return Err(Error::exchange(exchange, e));
                }
            }
        }

        let ids: Vec<OrderId> = handles.iter().map(|h| h.order_id.clone()).collect();
        info!("{} submitted group {:?}", key, ids);
        self.attach(&key, generation, &ids);
        Ok(handles)
    }

    /// Poll until `order_id` fills, at most `wait.rounds` times.
    ///
    /// Ends early when the order reaches a terminal non-filled status.
    pub async fn await_fill(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        order_id: &OrderId,
        wait: FillWait,
    ) -> Result<OrderUpdate> {
        let client = self.venue(exchange)?;
        for round in 1..=wait.rounds {
            match client.get_order_status(symbol, order_id).await {
                Ok(update) if update.status == OrderStatus::Filled => {
                    debug!("[{}] {} order {} filled after {} polls", exchange, symbol, order_id, round);
                    // A polled status releases the lock like a pushed one
                    self.on_status_push(exchange, &update);
                    return Ok(update);
                }
                Ok(update) if update.status.is_terminal() => {
                    self.on_status_push(exchange, &update);
                    return Err(Error::NotFilled {
                        exchange: exchange.clone(),
                        order_id: order_id.clone(),
                        status: update.status,
                    });
                }
                Ok(update) => debug!("[{}] {} order {} still {:?}", exchange, symbol, order_id, update.status),
                Err(e) => debug!("[{}] {} order {} status poll failed: {}", exchange, symbol, order_id, e),
            }
            if round < wait.rounds {
                tokio::time::sleep(wait.interval).await;
            }
        }

        Err(Error::FillTimeout {
            exchange: exchange.clone(),
            order_id: order_id.clone(),
            rounds: wait.rounds,
        })
    }

    // ========================================================================
    // Cancellation and dedup
    // ========================================================================

    /// Cancel one order; an acknowledged cancel releases its lock
    pub async fn cancel_order(&self, exchange: &ExchangeId, symbol: &str, order_id: &OrderId) -> Result<()> {
        let client = self.venue(exchange)?;
        match client.cancel_order(symbol, order_id).await {
            Ok(()) => {}
            Err(ExchangeError::NotFound(_)) => {
                debug!("[{}] {} order {} already gone", exchange, symbol, order_id);
            }
            Err(e) => return Err(Error::exchange(exchange, e)),
        }
        self.journal_cancel(exchange, order_id);
        self.release_ids(exchange, symbol, std::slice::from_ref(order_id), Release::CancelAck);
        Ok(())
    }

    /// Cancel every open order on `symbol`; releases every attached lock on it
    pub async fn cancel_all(&self, exchange: &ExchangeId, symbol: &str) -> Result<()> {
        let client = self.venue(exchange)?;
        // Listed first so the journal can record what the cancel covered
        let open = match &self.journal {
            Some(_) => client.get_open_orders(symbol).await.unwrap_or_else(|e| {
                debug!("[{}] {} open orders unavailable before cancel-all: {}", exchange, symbol, e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        client
            .cancel_all_orders(symbol)
            .await
            .map_err(|e| Error::exchange(exchange, e))?;
        for order in open.iter().filter(|o| o.status.is_active()) {
            self.journal_open_order(exchange, order, OrderEvent::Canceled);
        }

        for (key, pending) in self.held(exchange, symbol) {
            if !pending.order_ids.is_empty() {
                self.release(&key, pending.generation, Release::CancelAck);
            }
        }
        debug!("[{}] {} canceled all open orders", exchange, symbol);
        Ok(())
    }

    /// Cancel all but the most recent open order of `(category, side)`.
    ///
    /// Returns the canceled ids. Recency is the exchange-reported update
    /// time, falling back to creation time.
    pub async fn deduplicate(
        &self,
        exchange: &ExchangeId,
        symbol: &str,
        category: OrderCategory,
        side: Side,
    ) -> Result<Vec<OrderId>> {
        let client = self.venue(exchange)?;
        let open = client
            .get_open_orders(symbol)
            .await
            .map_err(|e| Error::exchange(exchange, e))?;

        let mut same: Vec<OpenOrder> = open
            .into_iter()
            .filter(|o| o.category == category && o.side == side && o.status.is_active())
            .collect();
        if same.len() <= 1 {
            return Ok(Vec::new());
        }

        warn!(
            "[{}] {} found {} open {} {} orders, keeping the newest",
            exchange,
            symbol,
            same.len(),
            category,
            side
        );
        same.sort_by(|a, b| b.recency().cmp(&a.recency()).then_with(|| b.order_id.cmp(&a.order_id)));
        let mut canceled = Vec::with_capacity(same.len() - 1);
        for order in same.iter().skip(1) {
            let id = &order.order_id;
            match client.cancel_order(symbol, id).await {
                Ok(()) | Err(ExchangeError::NotFound(_)) => {
                    info!("[{}] {} canceled duplicate {} {} order {}", exchange, symbol, category, side, id);
                    self.journal_open_order(exchange, order, OrderEvent::Canceled);
                    canceled.push(id.clone());
                }
                Err(e) => warn!("[{}] {} failed to cancel duplicate {}: {}", exchange, symbol, id, e),
            }
        }
        self.release_ids(exchange, symbol, &canceled, Release::CancelAck);
        Ok(canceled)
    }

    // ========================================================================
    // Push handling
    // ========================================================================

    /// A single order changed status
    pub fn on_status_push(&self, exchange: &ExchangeId, update: &OrderUpdate) {
        let owner = self
            .held(exchange, &update.symbol)
            .into_iter()
            .find(|(_, p)| p.order_ids.contains(&update.order_id));

        match owner {
            Some((key, pending)) => {
                if update.status.releases_lock() {
                    self.release(&key, pending.generation, Release::StatusPush(update.status));
                }
            }
            None => {
                if update.status.releases_lock() {
                    // May belong to a submission whose call has not returned yet
                    self.early.insert(
                        (exchange.clone(), update.order_id.clone()),
                        (update.status, Instant::now()),
                    );
                }
                debug!(
                    "[{}] {} status {:?} for untracked order {}",
                    exchange, update.symbol, update.status, update.order_id
                );
            }
        }
    }

    /// Full open-orders listing. A pending id that is missing or no longer
    /// NEW counts as complete.
    pub fn on_open_orders(&self, exchange: &ExchangeId, symbol: &str, orders: &[OpenOrder]) {
        for (key, pending) in self.held(exchange, symbol) {
            let done = pending.order_ids.iter().find_map(|id| match orders.iter().find(|o| o.order_id == *id) {
                None => Some(Release::MissingFromListing),
                Some(o) if o.status.releases_lock() => Some(Release::StatusPush(o.status)),
                Some(_) => None,
            });
            if let Some(reason) = done {
                self.release(&key, pending.generation, reason);
            }
        }
    }

    fn release_ids(&self, exchange: &ExchangeId, symbol: &str, ids: &[OrderId], reason: Release) {
        if ids.is_empty() {
            return;
        }
        for (key, pending) in self.held(exchange, symbol) {
            if pending.order_ids.iter().any(|id| ids.contains(id)) {
                self.release(&key, pending.generation, reason);
            }
        }
    }

    // ========================================================================
    // Deadlines and resets
    // ========================================================================

    /// Force every lock whose deadline is at or before `now` back to IDLE
    pub fn expire_due(&self, now: Instant) -> Vec<LockKey> {
        let mut expired = Vec::new();
        for (key, generation) in self.wheel.pop_due(now) {
            let removed = self
                .slots
                .remove_if(&key, |_, p| p.generation == generation && p.deadline <= now);
            if let Some((_, pending)) = removed {
                warn!(
                    "{} lock deadline expired after {:?} without status push (orders {:?}), forcing IDLE",
                    key,
                    now - pending.submitted_at,
                    pending.order_ids
                );
                expired.push(key);
            }
        }

        let ttl = self.config.early_status_ttl;
        self.early.retain(|_, (_, seen)| now.saturating_duration_since(*seen) < ttl);
        expired
    }

    /// Drop every lock on `(exchange, symbol)` regardless of state
    pub fn force_reset(&self, exchange: &ExchangeId, symbol: &str) -> usize {
        let held = self.held(exchange, symbol);
        for (key, pending) in &held {
            if self.slots.remove_if(key, |_, p| p.generation == pending.generation).is_some() {
                self.wheel.cancel(key, pending.generation);
            }
        }
        if !held.is_empty() {
            info!("[{}] {} force-reset {} lock(s) to IDLE", exchange, symbol, held.len());
        }
        held.len()
    }

    /// Background task firing lock deadlines. Stops once the controller is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                // No strong handle is held while sleeping
                let (next, notify) = {
                    let Some(controller) = weak.upgrade() else {
                        return;
                    };
                    (controller.wheel.next_deadline(), controller.wheel.notifier())
                };
                let changed = notify.notified();
                match next {
                    Some(at) => tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = changed => {}
                    },
                    None => tokio::select! {
                        _ = changed => {}
                        // Periodic wake so the weak handle is rechecked
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    },
                }
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                controller.expire_due(Instant::now());
            }
        })
    }

    fn journal_order(&self, exchange: &ExchangeId, spec: &OrderSpec, order_id: Option<OrderId>, event: OrderEvent) {
        if let Some(journal) = &self.journal {
            journal.record_order(OrderRecord {
                exchange: exchange.clone(),
                symbol: spec.symbol.clone(),
                order_id,
                category: spec.category,
                side: spec.side,
                quantity: spec.quantity,
                price: spec.price.or(spec.stop_price),
                event,
                at: Utc::now(),
            });
        }
    }

    fn journal_open_order(&self, exchange: &ExchangeId, order: &OpenOrder, event: OrderEvent) {
        if let Some(journal) = &self.journal {
            journal.record_order(OrderRecord {
                exchange: exchange.clone(),
                symbol: order.symbol.clone(),
                order_id: Some(order.order_id.clone()),
                category: order.category,
                side: order.side,
                quantity: order.quantity,
                price: order.price.or(order.stop_price),
                event,
                at: Utc::now(),
            });
        }
    }

    /// Record a cancel of an order this journal saw submitted
    fn journal_cancel(&self, exchange: &ExchangeId, order_id: &OrderId) {
        let Some(journal) = &self.journal else {
            return;
        };
        match journal.last_order(exchange, order_id) {
            Some(submitted) if submitted.event != OrderEvent::Canceled => journal.record_order(OrderRecord {
                event: OrderEvent::Canceled,
                at: Utc::now(),
                ..submitted
            }),
            Some(_) => {}
            None => debug!("[{}] canceled order {} has no journal record", exchange, order_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{BookLevel, OrderBookSnapshot, TimeInForce};
    use argus_gateway::PaperExchange;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "BTCUSDT";

    async fn setup() -> (Arc<PaperExchange>, OrderLifecycleController, ExchangeId) {
        let venue = Arc::new(PaperExchange::new("aster"));
        venue
            .set_book(OrderBookSnapshot {
                symbol: SYMBOL.into(),
                bids: vec![BookLevel::new(dec!(100), dec!(5))],
                asks: vec![BookLevel::new(dec!(101), dec!(5))],
                timestamp: Utc::now(),
            })
            .await;
        let id = venue.id().clone();
        let client: Arc<dyn ExchangeClient> = venue.clone();
        let controller = OrderLifecycleController::new(VenueRegistry::new([client]), ControllerConfig::default());
        (venue, controller, id)
    }

    fn resting_buy(price: rust_decimal::Decimal) -> OrderSpec {
        OrderSpec::limit(SYMBOL, Side::Buy, dec!(1), price, TimeInForce::GTX)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_is_already_locked() {
        let (_venue, controller, ex) = setup().await;

        controller.submit(&ex, resting_buy(dec!(99))).await.unwrap();
        let err = controller.submit(&ex, resting_buy(dec!(98))).await.unwrap_err();
        assert!(err.is_benign());

        // Other categories are independent
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Market));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_releases_immediately() {
        let (venue, controller, ex) = setup().await;
        venue.fail_next_creates(1);

        let err = controller.submit(&ex, resting_buy(dec!(99))).await.unwrap_err();
        assert!(err.exchange_error().is_some_and(|e| e.is_transient()));
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_new_push_releases_matching_lock() {
        let (_venue, controller, ex) = setup().await;
        let handle = controller.submit(&ex, resting_buy(dec!(99))).await.unwrap();

        let mut update = OrderUpdate {
            order_id: handle.order_id.clone(),
            symbol: SYMBOL.into(),
            status: OrderStatus::New,
            filled_qty: dec!(0),
            avg_price: None,
            timestamp: Utc::now(),
        };
        controller.on_status_push(&ex, &update);
        assert!(controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));

        update.order_id = "someone-else".into();
        update.status = OrderStatus::Filled;
        controller.on_status_push(&ex, &update);
        assert!(controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));

        update.order_id = handle.order_id;
        update.status = OrderStatus::PartiallyFilled;
        controller.on_status_push(&ex, &update);
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_pushed_before_attach_is_applied() {
        let (_venue, controller, ex) = setup().await;
        // The paper venue fills a market order before create_order returns;
        // the Filled push therefore lands before the id is attached.
        controller.on_status_push(
            &ex,
            &OrderUpdate {
                order_id: "aster-2".into(),
                symbol: SYMBOL.into(),
                status: OrderStatus::Filled,
                filled_qty: dec!(1),
                avg_price: Some(dec!(101)),
                timestamp: Utc::now(),
            },
        );
        let key = LockKey::new(&ex, SYMBOL, OrderCategory::Market);
        let generation = controller.acquire(&key, Side::Buy).unwrap();
        controller.attach(&key, generation, &["aster-2".to_string()]);

        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Market));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_from_listing_releases() {
        let (_venue, controller, ex) = setup().await;
        let handle = controller.submit(&ex, resting_buy(dec!(99))).await.unwrap();
        let pending = controller.pending(&ex, SYMBOL, OrderCategory::Limit).unwrap();
        assert_eq!(pending.order_ids, vec![handle.order_id]);

        controller.on_open_orders(&ex, SYMBOL, &[]);
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_forces_idle_once() {
        let (_venue, controller, ex) = setup().await;
        controller.submit(&ex, resting_buy(dec!(99))).await.unwrap();

        let start = Instant::now();
        assert!(controller.expire_due(start + Duration::from_millis(2999)).is_empty());
        let expired = controller.expire_due(start + Duration::from_secs(3));
        assert_eq!(expired.len(), 1);
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));

        // A second pass finds nothing to release
        assert!(controller.expire_due(start + Duration::from_secs(10)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_deadline_does_not_free_newer_lock() {
        let (_venue, controller, ex) = setup().await;
        let key = LockKey::new(&ex, SYMBOL, OrderCategory::Stop);

        let first = controller.acquire(&key, Side::Sell).unwrap();
        assert!(controller.release(&key, first, Release::CancelAck));
        let second = controller.acquire(&key, Side::Sell).unwrap();

        assert!(!controller.release(&key, first, Release::CancelAck));
        assert_eq!(controller.pending(&ex, SYMBOL, OrderCategory::Stop).unwrap().generation, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_does_not_keep_controller_alive() {
        let (_venue, controller, ex) = setup().await;
        let controller = Arc::new(controller);
        controller.submit(&ex, resting_buy(dec!(99))).await.unwrap();

        let reaper = controller.spawn_reaper();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        // The reaper is asleep until the 3s deadline
        let weak = Arc::downgrade(&controller);
        drop(controller);
        assert!(weak.upgrade().is_none());
        reaper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_places_all_members_under_one_lock() {
        let (venue, controller, ex) = setup().await;
        let sell = OrderSpec::limit(SYMBOL, Side::Sell, dec!(1), dec!(102), TimeInForce::GTX);

        let handles = controller.submit_group(&ex, vec![resting_buy(dec!(99)), sell]).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(venue.resting_orders(SYMBOL).len(), 2);
        assert_eq!(controller.pending(&ex, SYMBOL, OrderCategory::Limit).unwrap().order_ids.len(), 2);

        controller.cancel_all(&ex, SYMBOL).await.unwrap();
        assert!(venue.resting_orders(SYMBOL).is_empty());
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_rolls_back_on_partial_failure() {
        let (venue, controller, ex) = setup().await;
        // Zero quantity is rejected by the venue after the buy is placed
        let bad_sell = OrderSpec::limit(SYMBOL, Side::Sell, dec!(0), dec!(102), TimeInForce::GTX);

        let err = controller
            .submit_group(&ex, vec![resting_buy(dec!(99)), bad_sell])
            .await
            .unwrap_err();
        assert!(matches!(err.exchange_error(), Some(ExchangeError::Rejected(_))));
        assert!(venue.resting_orders(SYMBOL).is_empty());
        assert!(!controller.is_locked(&ex, SYMBOL, OrderCategory::Limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_members_must_share_category() {
        let (_venue, controller, ex) = setup().await;
        let err = controller
            .submit_group(
                &ex,
                vec![resting_buy(dec!(99)), OrderSpec::market(SYMBOL, Side::Sell, dec!(1))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGroup(_)));
        assert!(controller.submit_group(&ex, vec![]).await.is_err());
    }
}
