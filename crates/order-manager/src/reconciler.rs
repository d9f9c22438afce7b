//! Position Reconciler
//!
//! Owns the engine's belief about each (exchange, symbol) position and heals
//! it against the exchange's authoritative snapshot before every decision
//! tick. Stops and trailing stops can close a position without going through
//! the submission path, so startup-only reconciliation is not enough.
//!
//! | local     | authoritative | outcome                          |
//! |-----------|---------------|----------------------------------|
//! | open      | zero          | discard, closed externally (warn)|
//! | none      | non-zero      | adopt snapshot (warn)            |
//! | open      | different     | replace, drift (warn)            |
//! | any       | equal         | unchanged                        |

use std::sync::Arc;

use argus_core::{ExchangeId, PositionSnapshot, PositionView, Symbol};
use dashmap::DashMap;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::journal::StateJournal;
use crate::venues::VenueRegistry;

pub struct PositionReconciler {
    venues: VenueRegistry,
    views: DashMap<(ExchangeId, Symbol), PositionView>,
    journal: Option<Arc<StateJournal>>,
}

impl PositionReconciler {
    pub fn new(venues: VenueRegistry) -> Self {
        Self {
            venues,
            views: DashMap::new(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<StateJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fetch the authoritative position and fold it into the local view
    pub async fn reconcile(&self, exchange: &ExchangeId, symbol: &str) -> Result<PositionView> {
        let client = self.venues.get(exchange)?;
        let positions = client
            .get_positions()
            .await
            .map_err(|e| Error::exchange(exchange, e))?;

        let authoritative = positions
            .iter()
            .find(|p| p.symbol == symbol)
            .map(PositionView::from_snapshot)
            .unwrap_or_else(|| PositionView::flat(symbol));
        Ok(self.apply(exchange, authoritative))
    }

    /// Fold an already-fetched snapshot (an account push, say) into the view
    pub fn apply_snapshot(&self, exchange: &ExchangeId, snapshot: &PositionSnapshot) -> PositionView {
        self.apply(exchange, PositionView::from_snapshot(snapshot))
    }

    /// Replace the local view with `authoritative`, logging any divergence.
    ///
    /// Applying the same snapshot twice yields the same view.
    pub fn apply(&self, exchange: &ExchangeId, authoritative: PositionView) -> PositionView {
        let key = (exchange.clone(), authoritative.symbol.clone());
        let local = self
            .views
            .get(&key)
            .map(|v| v.value().clone())
            .unwrap_or_else(|| PositionView::flat(authoritative.symbol.clone()));

        let changed = match (local.is_open(), authoritative.is_open()) {
            (true, false) => {
                warn!(
                    "[{}] {} position {:?} {} closed externally, discarding local view",
                    exchange, local.symbol, local.direction, local.quantity
                );
                true
            }
            (false, true) => {
                warn!(
                    "[{}] {} adopting exchange position {:?} {} @ {}",
                    exchange,
                    authoritative.symbol,
                    authoritative.direction,
                    authoritative.quantity,
                    authoritative.entry_price
                );
                true
            }
            (true, true)
                if local.direction != authoritative.direction
                    || local.quantity != authoritative.quantity
                    || local.entry_price != authoritative.entry_price =>
            {
                warn!(
                    "[{}] {} position drift: local {:?} {} @ {}, exchange {:?} {} @ {}",
                    exchange,
                    local.symbol,
                    local.direction,
                    local.quantity,
                    local.entry_price,
                    authoritative.direction,
                    authoritative.quantity,
                    authoritative.entry_price
                );
                true
            }
            _ => {
                debug!("[{}] {} position unchanged", exchange, authoritative.symbol);
                false
            }
        };

        self.views.insert(key, authoritative.clone());
        if changed {
            if let Some(journal) = &self.journal {
                journal.record_position(exchange, &authoritative);
            }
        }
        authoritative
    }

    /// Current belief; flat when nothing is known
    pub fn view(&self, exchange: &ExchangeId, symbol: &str) -> PositionView {
        self.views
            .get(&(exchange.clone(), symbol.to_string()))
            .map(|v| v.value().clone())
            .unwrap_or_else(|| PositionView::flat(symbol))
    }

    /// Believe "none" until the next reconcile pass
    pub fn mark_flat(&self, exchange: &ExchangeId, symbol: &str) {
        let flat = PositionView::flat(symbol);
        self.views.insert((exchange.clone(), symbol.to_string()), flat.clone());
        if let Some(journal) = &self.journal {
            journal.record_position(exchange, &flat);
        }
    }
}
