//! Failure Recovery
//!
//! Last line of defence when a decision tick cannot finish safely: a leg
//! failed to submit, a fill wait timed out, or the tick raised something
//! unexpected. For every venue it:
//!
//! 1. takes the authoritative position (local belief if the venue is unreachable)
//! 2. cancels resting orders so nothing re-opens behind the flatten
//! 3. resets the venue's locks to IDLE
//! 4. flattens with a reduce-only market order
//! 5. marks the local belief as "none" until the next reconcile
//!
//! Recovery never returns an error; per-venue failures are collected in the
//! report and logged.

use std::sync::Arc;

use argus_core::{ExchangeId, OrderSpec, PositionView};
use log::{error, info, warn};

use crate::controller::OrderLifecycleController;
use crate::error::Error;
use crate::reconciler::PositionReconciler;

#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Venues whose open position was closed, with what was closed
    pub flattened: Vec<(ExchangeId, PositionView)>,
    pub failures: Vec<(ExchangeId, Error)>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct FailureRecovery {
    controller: Arc<OrderLifecycleController>,
    reconciler: Arc<PositionReconciler>,
}

impl FailureRecovery {
    pub fn new(controller: Arc<OrderLifecycleController>, reconciler: Arc<PositionReconciler>) -> Self {
        Self { controller, reconciler }
    }

    pub async fn on_fatal(&self, exchanges: &[ExchangeId], symbol: &str, reason: &str) -> RecoveryReport {
        error!("{} fatal: {}; flattening {:?}", symbol, reason, exchanges);
        let mut report = RecoveryReport::default();

        for exchange in exchanges {
            match self.flatten(exchange, symbol).await {
                Ok(Some(closed)) => {
                    info!(
                        "[{}] {} flattened {:?} {} @ {}",
                        exchange, symbol, closed.direction, closed.quantity, closed.entry_price
                    );
                    report.flattened.push((exchange.clone(), closed));
                }
                Ok(None) => info!("[{}] {} already flat", exchange, symbol),
                Err(e) => {
                    error!("[{}] {} recovery failed: {}", exchange, symbol, e);
                    report.failures.push((exchange.clone(), e));
                }
            }
            self.controller.force_reset(exchange, symbol);
            self.reconciler.mark_flat(exchange, symbol);
        }
        report
    }

    async fn flatten(&self, exchange: &ExchangeId, symbol: &str) -> Result<Option<PositionView>, Error> {
        let position = match self.reconciler.reconcile(exchange, symbol).await {
            Ok(view) => view,
            Err(e) => {
                warn!("[{}] {} position fetch failed during recovery, using local view: {}", exchange, symbol, e);
                self.reconciler.view(exchange, symbol)
            }
        };

        if let Err(e) = self.controller.cancel_all(exchange, symbol).await {
            warn!("[{}] {} cancel during recovery failed: {}", exchange, symbol, e);
        }
        self.controller.force_reset(exchange, symbol);

        let Some(side) = position.close_side().filter(|_| position.is_open()) else {
            return Ok(None);
        };
        let close = OrderSpec::market(symbol, side, position.quantity).reduce_only();
        self.controller.submit(exchange, close).await?;
        Ok(Some(position))
    }
}
