//! Argus Core Domain
//!
//! Pure, exchange-agnostic domain types for the Argus execution engine.
//! Every venue adapter translates its wire format into these types at the
//! boundary; nothing past the adapter ever inspects raw exchange fields.
//!
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod events;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Account & market state
    AccountSnapshot,
    Balance,
    BookLevel,
    // Venue identity
    ExchangeId,
    Kline,
    // Orders
    OpenOrder,
    OrderBookSnapshot,
    OrderCategory,
    OrderHandle,
    OrderId,
    OrderSpec,
    OrderStatus,
    OrderUpdate,
    // Positions
    PositionDirection,
    PositionSnapshot,
    PositionView,
    Side,
    Ticker,
    TimeInForce,
};
pub use events::{PushEvent, VenueEvent};
pub use values::{Price, Quantity, Symbol, Timestamp};
