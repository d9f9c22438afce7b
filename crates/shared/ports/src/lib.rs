//! Argus Ports
//!
//! Capability traits for the Argus execution engine. These define the
//! boundaries between the coordination core and the outside world:
//!
//! - [`ExchangeClient`]: signed REST calls plus push subscriptions for one venue
//! - [`Signal`]: the pure indicator function strategies consult
//!
//! Push subscriptions never call back into strategy code; they publish
//! [`VenueEvent`](argus_core::VenueEvent)s into an [`EventSink`].

mod error;
mod exchange;
mod signal;

pub use error::{ExchangeError, ExchangeResult};
pub use exchange::{EventSink, ExchangeClient};
pub use signal::{Cross, MarketHistory, Signal, SignalOutput, Trend};
