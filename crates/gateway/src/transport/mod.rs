//! Transport abstraction layer
//!
//! Push listeners and the state updater talk over one bounded tokio mpsc
//! channel of [`VenueEvent`]s. The `Subscriber` trait keeps the consumer side
//! swappable should events ever arrive from another process.

pub mod channel;

pub use channel::{EventReceiver, event_channel, sink_for};

use crate::error::TransportError;
use async_trait::async_trait;

/// Subscriber - receives messages from a channel
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: Send,
{
    /// Wait for the next message
    async fn next(&mut self) -> Result<M, TransportError>;

    /// Try to receive without blocking (returns None if no message available)
    fn try_next(&mut self) -> Result<Option<M>, TransportError>;
}
