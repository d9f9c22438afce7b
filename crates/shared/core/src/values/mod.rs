use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC (exchange-reported where available)
pub type Timestamp = DateTime<Utc>;

/// Trading pair identifier, e.g. `BTCUSDT`
pub type Symbol = String;
