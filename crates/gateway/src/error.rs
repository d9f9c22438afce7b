//! Error types for the gateway crate

use argus_core::ExchangeId;
use argus_ports::ExchangeError;
use thiserror::Error;

use crate::feed::StreamKind;

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Send failed: {0}")]
    Send(String),
}

/// Gateway-level errors (feed and adapter operations)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("[{exchange}] {stream} stream gave up after {attempts} reconnect attempts: {last_error}")]
    ReconnectExhausted {
        exchange: ExchangeId,
        stream: StreamKind,
        attempts: u32,
        last_error: ExchangeError,
    },

    #[error("Feed task failed: {0}")]
    Task(String),
}

impl GatewayError {
    /// Resource exhaustion that the process should not outlive
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, GatewayError::ReconnectExhausted { .. })
    }
}
