//! Bootstrap - wiring the process together
//!
//! Builds everything from a validated [`RunnerConfig`]:
//! - venue clients (credentials from the environment, optional seed book)
//! - the venue registry, state journal, lifecycle controller and its deadline
//!   reaper, position reconciler and failure recovery
//! - the market state cache, bounded event channel, dispatcher and one feed
//!   listener per venue stream
//! - leverage, applied once per venue
//! - the selected strategy engine
//!
//! [`Runtime::run`] then drives the decision loop until shutdown, or until a
//! feed listener exhausts its reconnects.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use argus_core::{BookLevel, OrderBookSnapshot};
use argus_gateway::{FeedConfig, FeedSet, MarketStateCache, PaperExchange, event_channel, spawn_feeds};
use argus_order_manager::{
    EventDispatcher, FailureRecovery, OrderLifecycleController, PositionReconciler, StateJournal, VenueRegistry,
};
use argus_ports::ExchangeClient;
use argus_strategy::{
    ArbitrageEngine, EngineContext, MakerEngine, SmaCrossSignal, StrategyEngine, TrendEngine,
};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ExchangeConfig, RunnerConfig, SeedBook, StrategyKind, VenueKind};
use crate::decision_loop::{DecisionLoop, LoopStats};
use crate::error::{Result, RunnerError};

fn seed_snapshot(symbol: &str, seed: &SeedBook) -> OrderBookSnapshot {
    OrderBookSnapshot {
        symbol: symbol.to_string(),
        bids: vec![BookLevel::new(seed.bid, seed.size)],
        asks: vec![BookLevel::new(seed.ask, seed.size)],
        timestamp: Utc::now(),
    }
}

async fn build_venue(config: &ExchangeConfig, symbol: &str) -> Result<Arc<dyn ExchangeClient>> {
    match config.kind {
        VenueKind::Paper => {
            let mut venue = PaperExchange::new(config.exchange_id());
            if let Some(credentials) = config.credentials()? {
                info!("[{}] using api key {}", config.id, credentials.api_key);
                venue = venue.with_credentials(credentials);
            }
            if let Some(seed) = &config.seed_book {
                venue.set_book(seed_snapshot(symbol, seed)).await;
            }
            info!("[{}] paper venue ready", config.id);
            Ok(Arc::new(venue))
        }
    }
}

/// Construct every configured venue client
pub async fn build_venues(config: &RunnerConfig) -> Result<Vec<Arc<dyn ExchangeClient>>> {
    let mut clients = Vec::with_capacity(config.exchanges.len());
    for exchange in &config.exchanges {
        clients.push(build_venue(exchange, &config.symbol).await?);
    }
    Ok(clients)
}

/// The engine `config.strategy.kind` selects
pub fn build_engine(config: &RunnerConfig, ctx: EngineContext) -> Result<Box<dyn StrategyEngine>> {
    let venues = config.strategy_venues();
    let kind = config.strategy.kind;
    let not_enough = || ConfigError::NotEnoughExchanges {
        strategy: kind,
        needed: kind.venues_needed(),
        configured: venues.len(),
    };

    let engine: Box<dyn StrategyEngine> = match kind {
        StrategyKind::Trend => {
            let venue = venues.first().cloned().ok_or_else(not_enough)?;
            let signal = Arc::new(SmaCrossSignal::new(config.strategy.sma_period));
            Box::new(TrendEngine::new(
                ctx,
                venue,
                &config.symbol,
                config.quantity,
                config.strategy.trend.clone(),
                signal,
            ))
        }
        StrategyKind::Maker => {
            let venue = venues.first().cloned().ok_or_else(not_enough)?;
            Box::new(MakerEngine::new(
                ctx,
                venue,
                &config.symbol,
                config.quantity,
                config.strategy.maker.clone(),
            ))
        }
        StrategyKind::Arbitrage => {
            let [a, b, ..] = venues.as_slice() else {
                return Err(not_enough().into());
            };
            Box::new(ArbitrageEngine::new(
                ctx,
                a.clone(),
                b.clone(),
                &config.symbol,
                config.quantity,
                config.arbitrage_config(),
            )?)
        }
    };
    Ok(engine)
}

/// A fully wired process, not yet ticking
pub struct Runtime {
    ctx: EngineContext,
    engine: Box<dyn StrategyEngine>,
    feeds: FeedSet,
    dispatcher: JoinHandle<u64>,
    reaper: JoinHandle<()>,
    tick_interval: Duration,
}

impl Runtime {
    /// Build venues from `config`, then wire them
    pub async fn bootstrap(config: &RunnerConfig) -> Result<Self> {
        config.validate()?;
        let clients = build_venues(config).await?;
        Self::assemble(config, clients).await
    }

    /// Wire already-constructed venue clients
    pub async fn assemble(config: &RunnerConfig, clients: Vec<Arc<dyn ExchangeClient>>) -> Result<Self> {
        config.validate()?;
        let symbol = config.symbol.as_str();

        for client in &clients {
            client
                .set_leverage(symbol, config.leverage)
                .await
                .map_err(|source| RunnerError::Setup {
                    exchange: client.id().clone(),
                    source,
                })?;
            info!("[{}] {} leverage set to {}x", client.id(), symbol, config.leverage);
        }

        let venues = VenueRegistry::new(clients.iter().cloned());
        let journal = Arc::new(match &config.journal_path {
            Some(path) => StateJournal::open(path)?,
            None => StateJournal::in_memory(),
        });

        let controller = Arc::new(
            OrderLifecycleController::new(venues.clone(), config.controller_config()).with_journal(journal.clone()),
        );
        let reaper = controller.spawn_reaper();
        let reconciler = Arc::new(PositionReconciler::new(venues).with_journal(journal.clone()));
        let recovery = Arc::new(FailureRecovery::new(controller.clone(), reconciler.clone()));

        // Adopt whatever is already open before the first tick
        for client in &clients {
            match reconciler.reconcile(client.id(), symbol).await {
                Ok(view) if view.is_open() => info!(
                    "[{}] {} resuming with {:?} {} @ {}",
                    client.id(),
                    symbol,
                    view.direction,
                    view.quantity,
                    view.entry_price
                ),
                Ok(_) => {}
                Err(e) => warn!("[{}] {} initial reconcile failed: {}", client.id(), symbol, e),
            }
        }

        let cache = MarketStateCache::new();
        let ctx = EngineContext {
            cache: cache.clone(),
            controller: controller.clone(),
            reconciler,
            recovery,
            journal,
        };
        let engine = build_engine(config, ctx.clone())?;

        let (tx, rx) = event_channel(config.channel_capacity);
        let dispatcher = tokio::spawn(EventDispatcher::new(cache, controller).run(rx));
        let feed_config = FeedConfig {
            max_reconnect_attempts: config.max_reconnect_attempts,
            ..Default::default()
        };
        let feeds = spawn_feeds(&clients, symbol, &tx, &feed_config);
        drop(tx);

        info!(
            "{} engine on {} across {} venue(s), {} feed listeners",
            engine.name(),
            symbol,
            engine.venues().len(),
            feeds.len()
        );

        Ok(Self {
            ctx,
            engine,
            feeds,
            dispatcher,
            reaper,
            tick_interval: config.tick_interval(),
        })
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Tick until `shutdown` resolves.
    ///
    /// Returns an error when a feed listener exhausts its reconnects or the
    /// decision loop dies; either way the background tasks are stopped first.
    pub async fn run<F>(self, shutdown: F) -> Result<LoopStats>
    where
        F: Future<Output = ()>,
    {
        let Runtime {
            ctx,
            engine,
            mut feeds,
            dispatcher,
            reaper,
            tick_interval,
        } = self;
        let journal = ctx.journal.clone();
        let recovery = ctx.recovery.clone();
        let venues = engine.venues();
        let symbol = engine.symbol().to_string();

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut decision = tokio::spawn(DecisionLoop::new(engine, ctx, tick_interval).run(stop_rx));
        tokio::pin!(shutdown);

        let outcome: Result<()> = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                joined = &mut decision => {
                    let reason = match joined {
                        Ok(stats) => format!("returned early after {} ticks", stats.ticks),
                        Err(e) => {
                            // Nothing may stay open once the loop is gone
                            if e.is_panic() {
                                let report = recovery.on_fatal(&venues, &symbol, "decision loop panicked").await;
                                if !report.is_clean() {
                                    error!("{} recovery left {} venue(s) unresolved", symbol, report.failures.len());
                                }
                            }
                            e.to_string()
                        }
                    };
                    feeds.abort_all();
                    dispatcher.abort();
                    reaper.abort();
                    journal.flush();
                    error!("Decision loop ended: {}", reason);
                    return Err(RunnerError::Task(reason));
                }
                Some(exit) = feeds.next_exit(), if !feeds.is_empty() => match exit {
                    Err(e) if e.is_exhaustion() => {
                        error!("Giving up: {}", e);
                        break Err(e.into());
                    }
                    Err(e) => warn!("Feed listener ended: {}", e),
                    Ok(()) => info!("Feed listener finished, {} remaining", feeds.len()),
                },
            }
        };

        // The send only fails if the loop already dropped its receiver
        let _ = stop_tx.send(true);
        let stats = decision.await.map_err(|e| RunnerError::Task(e.to_string()));
        feeds.abort_all();
        dispatcher.abort();
        reaper.abort();
        journal.flush();

        let snapshot = journal.snapshot();
        info!(
            "Stopped: {} trades, cumulative pnl {}, {} open position(s) journaled",
            snapshot.trade_count,
            snapshot.cumulative_pnl,
            snapshot.positions.len()
        );
        outcome?;
        stats
    }
}
