//! Decision loop
//!
//! One loop per strategy instance, ticking on a fixed interval:
//!
//! ```text
//!   interval ──► reconcile every venue ──► engine.tick() ──► outcome
//!                      │ failed                  │ error
//!                      ▼                         ▼
//!                 skip this tick        benign ──► debug, no action
//!                                       exchange ──► warn, no action
//!                                       leg abort ──► reset engine
//!                                       fatal ──► FailureRecovery, reset engine
//!                                       panic ──► FailureRecovery, reset engine
//! ```
//!
//! The loop is the fault boundary: no tick error or panic ends it. Only the
//! stop signal does, and a tick in progress always completes first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use argus_strategy::{Action, EngineContext, StrategyEngine, StrategyError};
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What one tick came to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Acted(Action),
    /// Benign error; nothing to do this tick
    Idle,
    /// Position reconciliation failed, engine not run
    Skipped,
    /// Exchange call failed; no action taken this tick
    Failed,
    /// Positions were flattened and the engine reset
    Recovered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    /// Ticks that opened or closed a position
    pub trades: u64,
    pub skipped: u64,
    pub failed: u64,
    pub recoveries: u64,
}

pub struct DecisionLoop {
    engine: Box<dyn StrategyEngine>,
    ctx: EngineContext,
    tick_interval: Duration,
    stats: LoopStats,
}

impl DecisionLoop {
    pub fn new(engine: Box<dyn StrategyEngine>, ctx: EngineContext, tick_interval: Duration) -> Self {
        Self {
            engine,
            ctx,
            tick_interval,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub async fn tick_once(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        let symbol = self.engine.symbol().to_string();

        for venue in self.engine.venues() {
            if let Err(e) = self.ctx.reconciler.reconcile(&venue, &symbol).await {
                warn!("[{}] {} reconcile failed, skipping tick: {}", venue, symbol, e);
                self.stats.skipped += 1;
                return TickOutcome::Skipped;
            }
        }

        let ticked = match AssertUnwindSafe(self.engine.tick()).catch_unwind().await {
            Ok(ticked) => ticked,
            Err(payload) => {
                let reason = format!("tick panicked: {}", panic_message(payload.as_ref()));
                error!("{} {} {}", self.engine.name(), symbol, reason);
                return self.recover(&symbol, &reason).await;
            }
        };

        match ticked {
            Ok(action) => {
                match action {
                    Action::Hold | Action::Wait => debug!("{} {} {:?}", self.engine.name(), symbol, action),
                    _ => {
                        self.stats.trades += 1;
                        info!("{} {} {:?}", self.engine.name(), symbol, action);
                    }
                }
                TickOutcome::Acted(action)
            }
            Err(e) if e.is_benign() => {
                debug!("{} {} skipped: {}", self.engine.name(), symbol, e);
                TickOutcome::Idle
            }
            Err(StrategyError::LegAborted(reason)) => {
                warn!("{} {} leg aborted, already recovered: {}", self.engine.name(), symbol, reason);
                self.engine.reset();
                self.stats.recoveries += 1;
                TickOutcome::Recovered
            }
            Err(e) if e.is_fatal() => {
                error!("{} {} tick failed: {}", self.engine.name(), symbol, e);
                self.recover(&symbol, &e.to_string()).await
            }
            Err(e) => {
                warn!("{} {} no action this tick: {}", self.engine.name(), symbol, e);
                self.stats.failed += 1;
                TickOutcome::Failed
            }
        }
    }

    /// Flatten every venue the engine trades, then reset it
    async fn recover(&mut self, symbol: &str, reason: &str) -> TickOutcome {
        let report = self.ctx.recovery.on_fatal(&self.engine.venues(), symbol, reason).await;
        if !report.is_clean() {
            error!("{} recovery left {} venue(s) unresolved", symbol, report.failures.len());
        }
        self.engine.reset();
        self.stats.recoveries += 1;
        TickOutcome::Recovered
    }

    /// Tick until `stop` turns true or its sender goes away
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> LoopStats {
        info!(
            "{} {} decision loop started, every {:?} on {:?}",
            self.engine.name(),
            self.engine.symbol(),
            self.tick_interval,
            self.engine.venues()
        );
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("{} decision loop stopped: {:?}", self.engine.name(), self.stats);
        self.stats
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
