use thiserror::Error;

/// Errors surfaced by an [`ExchangeClient`](crate::ExchangeClient)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stream disconnected: {0}")]
    Disconnected(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Unsupported by venue: {0}")]
    Unsupported(String),
}

impl ExchangeError {
    /// Connection drops, timeouts and 5xx responses. Only the push
    /// subscription layer retries these; order submission never does.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::Disconnected(_) => {
                true
            }
            ExchangeError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
