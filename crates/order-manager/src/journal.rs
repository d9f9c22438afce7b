//! State journal
//!
//! Key-value snapshot of order history, cumulative pnl, trade count and open
//! positions, rewritten after every state-changing operation and reloadable on
//! restart. It exists for observability and resume only; on restart the
//! position reconciler, not this file, is the source of truth.
//!
//! Writes go to `<path>.tmp` and are renamed into place so a crash never
//! leaves a torn file. Inside a tokio runtime the file I/O runs on the
//! blocking pool; snapshots staged while a write is in progress coalesce, so
//! only the latest one reaches disk. [`StateJournal::flush`] writes whatever
//! is still staged.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use argus_core::{ExchangeId, OrderCategory, OrderId, PositionView, Price, Quantity, Side, Symbol, Timestamp};
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_HISTORY: usize = 1000;

/// What happened to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Submitted,
    Rejected,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub order_id: Option<OrderId>,
    pub category: OrderCategory,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub event: OrderEvent,
    pub at: Timestamp,
}

/// Persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalSnapshot {
    /// Most recent last
    pub orders: VecDeque<OrderRecord>,
    pub cumulative_pnl: Decimal,
    pub trade_count: u64,
    /// Keyed `exchange:symbol`; flat positions are not stored
    pub positions: BTreeMap<String, PositionView>,
    pub updated_at: Option<Timestamp>,
}

/// Latest serialized snapshot waiting for disk
struct Persister {
    path: PathBuf,
    staged: Mutex<Option<Vec<u8>>>,
    scheduled: AtomicBool,
    io: Mutex<()>,
}

impl Persister {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            staged: Mutex::new(None),
            scheduled: AtomicBool::new(false),
            io: Mutex::new(()),
        }
    }

    fn stage(self: &Arc<Self>, bytes: Vec<u8>) {
        *self.staged.lock() = Some(bytes);
        if self.scheduled.swap(true, Ordering::AcqRel) {
            // The running drain picks it up
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let persister = self.clone();
                handle.spawn_blocking(move || persister.drain());
            }
            Err(_) => self.drain(),
        }
    }

    fn drain(&self) {
        let _io = self.io.lock();
        loop {
            let next = self.staged.lock().take();
            match next {
                Some(bytes) => self.write(&bytes),
                None => {
                    self.scheduled.store(false, Ordering::Release);
                    // A stage that raced the store above found `scheduled` still set
                    if self.staged.lock().is_none() || self.scheduled.swap(true, Ordering::AcqRel) {
                        return;
                    }
                }
            }
        }
    }

    fn flush(&self) {
        let _io = self.io.lock();
        let next = self.staged.lock().take();
        if let Some(bytes) = next {
            self.write(&bytes);
        }
    }

    // Persistence failures never block trading
    fn write(&self, bytes: &[u8]) {
        if let Err(e) = write_atomically(&self.path, bytes) {
            warn!("Journal write failed: {}", e);
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| Error::Journal(format!("write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| Error::Journal(format!("rename {}: {}", path.display(), e)))?;
    debug!("Journal persisted to {}", path.display());
    Ok(())
}

pub struct StateJournal {
    persister: Option<Arc<Persister>>,
    max_orders: usize,
    state: Mutex<JournalSnapshot>,
}

impl StateJournal {
    /// Journal that keeps state in memory only
    pub fn in_memory() -> Self {
        Self {
            persister: None,
            max_orders: DEFAULT_HISTORY,
            state: Mutex::new(JournalSnapshot::default()),
        }
    }

    /// Journal backed by `path`, resuming from it when it exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let loaded = Self::load(&path)?;
            info!(
                "Resumed journal {}: {} trades, cumulative pnl {}",
                path.display(),
                loaded.trade_count,
                loaded.cumulative_pnl
            );
            loaded
        } else {
            JournalSnapshot::default()
        };

        Ok(Self {
            persister: Some(Arc::new(Persister::new(path))),
            max_orders: DEFAULT_HISTORY,
            state: Mutex::new(snapshot),
        })
    }

    pub fn load(path: &Path) -> Result<JournalSnapshot> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Journal(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| Error::Journal(format!("parse {}: {}", path.display(), e)))
    }

    pub fn snapshot(&self) -> JournalSnapshot {
        self.state.lock().clone()
    }

    /// Most recent record of `order_id` on `exchange`
    pub fn last_order(&self, exchange: &ExchangeId, order_id: &OrderId) -> Option<OrderRecord> {
        self.state
            .lock()
            .orders
            .iter()
            .rev()
            .find(|r| r.exchange == *exchange && r.order_id.as_ref() == Some(order_id))
            .cloned()
    }

    /// Write the latest staged snapshot now
    pub fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush();
        }
    }

    pub fn record_order(&self, record: OrderRecord) {
        self.mutate(|s| {
            s.orders.push_back(record);
            while s.orders.len() > self.max_orders {
                s.orders.pop_front();
            }
        });
    }

    pub fn record_position(&self, exchange: &ExchangeId, view: &PositionView) {
        let key = format!("{}:{}", exchange, view.symbol);
        self.mutate(|s| {
            if view.is_open() {
                s.positions.insert(key, view.clone());
            } else {
                s.positions.remove(&key);
            }
        });
    }

    /// Count a closed trade; returns (trade count, cumulative pnl)
    pub fn record_trade(&self, pnl: Decimal) -> (u64, Decimal) {
        let mut totals = (0, Decimal::ZERO);
        self.mutate(|s| {
            s.trade_count += 1;
            s.cumulative_pnl += pnl;
            totals = (s.trade_count, s.cumulative_pnl);
        });
        info!("Trade #{} closed, pnl {} (cumulative {})", totals.0, pnl, totals.1);
        totals
    }

    fn mutate(&self, f: impl FnOnce(&mut JournalSnapshot)) {
        let serialized = {
            let mut state = self.state.lock();
            f(&mut state);
            state.updated_at = Some(Utc::now());
            match &self.persister {
                Some(_) => serde_json::to_vec_pretty(&*state),
                None => return,
            }
        };

        match (serialized, &self.persister) {
            (Ok(bytes), Some(persister)) => persister.stage(bytes),
            (Err(e), _) => warn!("Journal serialization failed: {}", e),
            (Ok(_), None) => {}
        }
    }
}

impl Drop for StateJournal {
    fn drop(&mut self) {
        self.flush();
    }
}
