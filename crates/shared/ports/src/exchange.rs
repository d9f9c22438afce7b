use argus_core::{
    AccountSnapshot, ExchangeId, Kline, OpenOrder, OrderBookSnapshot, OrderHandle, OrderId, OrderSpec,
    OrderUpdate, PositionSnapshot, PushEvent, Ticker, VenueEvent,
};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ExchangeError, ExchangeResult};

/// Where a push subscription publishes its events.
///
/// Wraps the bounded channel feeding the state updater and stamps every
/// event with the venue it came from. Sending awaits when the channel is
/// full, so a slow consumer back-pressures the listener instead of growing
/// memory.
#[derive(Debug, Clone)]
pub struct EventSink {
    exchange: ExchangeId,
    tx: mpsc::Sender<VenueEvent>,
}

impl EventSink {
    pub fn new(exchange: ExchangeId, tx: mpsc::Sender<VenueEvent>) -> Self {
        Self { exchange, tx }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    /// Publish one event. Fails once the consumer side has gone away.
    pub async fn publish(&self, event: PushEvent) -> ExchangeResult<()> {
        self.tx
            .send(VenueEvent::new(self.exchange.clone(), event))
            .await
            .map_err(|_| ExchangeError::Disconnected(format!("[{}] event channel closed", self.exchange)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer side has gone away
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// One venue's trading capability.
///
/// Implementations translate their wire format into `argus_core` types at
/// this boundary. Request signing and credentials stay inside the adapter.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn id(&self) -> &ExchangeId;

    async fn get_order_book(&self, symbol: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot>;

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;

    async fn get_klines(&self, symbol: &str, limit: usize) -> ExchangeResult<Vec<Kline>>;

    async fn get_account(&self) -> ExchangeResult<AccountSnapshot>;

    async fn get_positions(&self) -> ExchangeResult<Vec<PositionSnapshot>>;

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    async fn create_order(&self, spec: &OrderSpec) -> ExchangeResult<OrderHandle>;

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<()>;

    /// Cancel several orders; venues with a batch endpoint override this
    async fn cancel_orders(&self, symbol: &str, order_ids: &[OrderId]) -> ExchangeResult<()> {
        for order_id in order_ids {
            self.cancel_order(symbol, order_id).await?;
        }
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()>;

    async fn get_order_status(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<OrderUpdate>;

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> ExchangeResult<()> {
        Ok(())
    }

    // Push subscriptions. Each runs until the stream drops (returning the
    // disconnect error) or the sink closes (returning Ok).

    async fn watch_order_book(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()>;

    async fn watch_ticker(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()>;

    async fn watch_klines(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()>;

    async fn watch_account(&self, sink: EventSink) -> ExchangeResult<()>;

    /// Publishes both single `OrderUpdate`s and full open-orders listings
    async fn watch_order_status(&self, symbol: &str, sink: EventSink) -> ExchangeResult<()>;
}
