//! Event dispatcher
//!
//! Single consumer of the bounded push-event channel. Every event is written
//! to the market state cache; order-status events are also handed to the
//! lifecycle controller so matching locks are released. Nothing here calls
//! into a strategy.

use std::sync::Arc;

use argus_core::{PushEvent, VenueEvent};
use argus_gateway::{MarketStateCache, Subscriber, TransportError};
use log::{debug, info};

use crate::controller::OrderLifecycleController;

pub struct EventDispatcher {
    cache: MarketStateCache,
    controller: Arc<OrderLifecycleController>,
}

impl EventDispatcher {
    pub fn new(cache: MarketStateCache, controller: Arc<OrderLifecycleController>) -> Self {
        Self { cache, controller }
    }

    pub fn handle(&self, event: &VenueEvent) {
        self.cache.apply(event);
        match &event.event {
            PushEvent::OrderUpdate(update) => self.controller.on_status_push(&event.exchange, update),
            PushEvent::OpenOrders { symbol, orders } => {
                self.controller.on_open_orders(&event.exchange, symbol, orders)
            }
            _ => {}
        }
    }

    /// Drain `events` until every publisher has gone away; returns the number
    /// of events handled
    pub async fn run<S>(self, mut events: S) -> u64
    where
        S: Subscriber<VenueEvent>,
    {
        let mut handled = 0u64;
        loop {
            match events.next().await {
                Ok(event) => {
                    debug!("[{}] {} event", event.exchange, event.event.kind());
                    self.handle(&event);
                    handled += 1;
                }
                Err(TransportError::ChannelClosed) => break,
                Err(e) => debug!("Event receive failed: {}", e),
            }
        }
        info!("Event dispatcher stopped after {} events", handled);
        handled
    }
}
