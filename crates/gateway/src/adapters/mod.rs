//! Exchange adapters
//!
//! Adapters implement `argus_ports::ExchangeClient` for one venue each,
//! speaking only `argus_core` types and holding the venue credentials.

pub mod paper;

pub use paper::{Credentials, PaperExchange};
