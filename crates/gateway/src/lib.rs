//! Argus Gateway
//!
//! Everything between the venues and the coordination core:
//! - [`MarketStateCache`]: last-write-wins view of books, tickers, accounts,
//!   positions and open orders per exchange
//! - Bounded push-event channel and reconnect-with-backoff feed listeners
//! - [`PaperExchange`]: in-memory `ExchangeClient` for dry runs and tests
//!
//! ## Architecture
//!
//! ```text
//!  Venue A      Venue B
//!     │            │   watch_* subscriptions
//!  ┌──▼────────────▼──┐
//!  │  Feed listeners  │  reconnect with backoff, capped
//!  └────────┬─────────┘
//!           │ bounded mpsc<VenueEvent>
//!  ┌────────▼─────────┐
//!  │ Event dispatcher │  (order-manager)
//!  └───┬──────────┬───┘
//!      │          │
//!  ┌───▼───┐  ┌───▼────────┐
//!  │ Cache │  │ Controller │
//!  └───────┘  └────────────┘
//! ```
//!
//! Listeners never call strategy code; they only publish events.

pub mod adapters;
pub mod backoff;
pub mod error;
pub mod feed;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use adapters::paper::{Credentials, PaperExchange};
pub use backoff::ReconnectBackoff;
pub use error::{GatewayError, TransportError};
pub use feed::{FeedConfig, FeedSet, StreamKind, run_stream, spawn_feeds};
pub use state::{Cached, MarketStateCache, StateKind, StateValue};
pub use transport::{EventReceiver, Subscriber, event_channel, sink_for};
