//! Bounded tokio channel transport for single-process mode
//!
//! Events are passed by value; no serialization. The channel is bounded so a
//! stalled consumer applies back-pressure to the venue listeners.

use crate::error::TransportError;
use crate::transport::Subscriber;
use argus_core::{ExchangeId, VenueEvent};
use argus_ports::EventSink;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Create the push-event channel with the given capacity.
///
/// Returns the sender (cloned into one [`EventSink`] per venue via
/// [`sink_for`]) and the single receiving end.
pub fn event_channel(capacity: usize) -> (mpsc::Sender<VenueEvent>, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, EventReceiver { rx })
}

/// Build a venue-stamped sink over the shared sender
pub fn sink_for(exchange: &ExchangeId, tx: &mpsc::Sender<VenueEvent>) -> EventSink {
    EventSink::new(exchange.clone(), tx.clone())
}

/// Receiving end of the push-event channel
pub struct EventReceiver {
    rx: mpsc::Receiver<VenueEvent>,
}

impl EventReceiver {
    /// Number of events waiting to be drained
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[async_trait]
impl Subscriber<VenueEvent> for EventReceiver {
    async fn next(&mut self) -> Result<VenueEvent, TransportError> {
        self.rx.recv().await.ok_or(TransportError::ChannelClosed)
    }

    fn try_next(&mut self) -> Result<Option<VenueEvent>, TransportError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::ChannelClosed),
        }
    }
}
