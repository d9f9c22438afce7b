//! Push-feed listeners.
//!
//! One task per (venue, stream). Each task drives the venue's `watch_*`
//! subscription and, when it drops, reconnects with [`ReconnectBackoff`].
//! A subscription that stayed up for `stable_after` resets the failure count,
//! so only consecutive failures count toward the cap. Exhausting the cap ends
//! the task with [`GatewayError::ReconnectExhausted`].

use std::sync::Arc;
use std::time::Duration;

use argus_core::VenueEvent;
use argus_ports::{EventSink, ExchangeClient, ExchangeResult};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::backoff::ReconnectBackoff;
use crate::error::GatewayError;
use crate::transport::sink_for;

/// A push subscription type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    OrderBook,
    Ticker,
    Klines,
    Account,
    OrderStatus,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::OrderBook,
        StreamKind::Ticker,
        StreamKind::Klines,
        StreamKind::Account,
        StreamKind::OrderStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::OrderBook => "order_book",
            StreamKind::Ticker => "ticker",
            StreamKind::Klines => "klines",
            StreamKind::Account => "account",
            StreamKind::OrderStatus => "order_status",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconnect policy for feed listeners
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Consecutive failed reconnects before giving up
    pub max_reconnect_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Jitter as a fraction of the delay
    pub jitter: f64,
    /// A subscription that lived this long counts as healthy
    pub stable_after: Duration,
    pub streams: Vec<StreamKind>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: 0.1,
            stable_after: Duration::from_secs(30),
            streams: StreamKind::ALL.to_vec(),
        }
    }
}

async fn watch(client: &dyn ExchangeClient, stream: StreamKind, symbol: &str, sink: EventSink) -> ExchangeResult<()> {
    match stream {
        StreamKind::OrderBook => client.watch_order_book(symbol, sink).await,
        StreamKind::Ticker => client.watch_ticker(symbol, sink).await,
        StreamKind::Klines => client.watch_klines(symbol, sink).await,
        StreamKind::Account => client.watch_account(sink).await,
        StreamKind::OrderStatus => client.watch_order_status(symbol, sink).await,
    }
}

/// Drive one subscription until the consumer goes away or reconnects are exhausted
pub async fn run_stream(
    client: Arc<dyn ExchangeClient>,
    stream: StreamKind,
    symbol: String,
    sink: EventSink,
    config: FeedConfig,
) -> Result<(), GatewayError> {
    let exchange = client.id().clone();
    let mut backoff = ReconnectBackoff::new(
        config.initial_backoff,
        config.max_backoff,
        config.jitter,
        config.max_reconnect_attempts,
    );

    loop {
        let started = Instant::now();
        let outcome = watch(client.as_ref(), stream, &symbol, sink.clone()).await;

        let err = match outcome {
            Ok(()) => {
                info!("[{}] {} {} stream finished", exchange, symbol, stream);
                return Ok(());
            }
            Err(_) if sink.is_closed() => {
                info!("[{}] {} {} consumer gone, stopping stream", exchange, symbol, stream);
                return Ok(());
            }
            Err(err) => err,
        };

        if started.elapsed() >= config.stable_after {
            backoff.reset();
        }
        if !err.is_transient() {
            error!("[{}] {} {} stream failed with non-transient error: {}", exchange, symbol, stream, err);
        }

        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    "[{}] {} {} stream dropped ({}), reconnect {}/{} in {:?}",
                    exchange,
                    symbol,
                    stream,
                    err,
                    backoff.attempt(),
                    backoff.max_attempts(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(
                    "[{}] {} {} stream exhausted {} reconnect attempts: {}",
                    exchange,
                    symbol,
                    stream,
                    backoff.max_attempts(),
                    err
                );
                return Err(GatewayError::ReconnectExhausted {
                    exchange,
                    stream,
                    attempts: backoff.max_attempts(),
                    last_error: err,
                });
            }
        }
    }
}

/// The running listener tasks of every venue
#[derive(Default)]
pub struct FeedSet {
    tasks: JoinSet<Result<(), GatewayError>>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn one listener per configured stream for `client`
    pub fn spawn_venue(
        &mut self,
        client: Arc<dyn ExchangeClient>,
        symbol: &str,
        tx: &mpsc::Sender<VenueEvent>,
        config: &FeedConfig,
    ) {
        for &stream in &config.streams {
            let sink = sink_for(client.id(), tx);
            info!("[{}] {} starting {} stream", client.id(), symbol, stream);
            self.tasks.spawn(run_stream(
                Arc::clone(&client),
                stream,
                symbol.to_string(),
                sink,
                config.clone(),
            ));
        }
    }

    /// Wait for the next listener to end. `None` once no listeners remain.
    pub async fn next_exit(&mut self) -> Option<Result<(), GatewayError>> {
        let joined = self.tasks.join_next().await?;
        Some(match joined {
            Ok(result) => result,
            Err(join_err) => Err(GatewayError::Task(join_err.to_string())),
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
    }
}

/// Spawn listeners for every venue
pub fn spawn_feeds(
    clients: &[Arc<dyn ExchangeClient>],
    symbol: &str,
    tx: &mpsc::Sender<VenueEvent>,
    config: &FeedConfig,
) -> FeedSet {
    let mut set = FeedSet::new();
    for client in clients {
        set.spawn_venue(Arc::clone(client), symbol, tx, config);
    }
    set
}
