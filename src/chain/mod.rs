/// JSON-RPC subscription frames
pub mod message;
/// Rupees-per-ether lookup
pub mod rate;
/// WebSocket subscription loop
pub mod watcher;

use thiserror::Error;

pub use message::{parse_message, parse_quantity, subscribe_request, ChainMessage, TxEvent};
pub use rate::RateProvider;
pub use watcher::{ChainWatcher, WatcherConfig};

/// Errors from the chain subscription
#[derive(Debug, Error)]
pub enum ChainError {
    /// Could not reach the endpoint or complete the handshake
    #[error("connection failed: {0}")]
    Connect(String),

    /// Handshake did not finish within the connect timeout
    #[error("connection timed out after {0} seconds")]
    Timeout(u64),

    /// WebSocket protocol failure on an open connection
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Frame is not valid JSON or lacks required fields
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Transaction value is not a hex quantity
    #[error("invalid transaction value: {0}")]
    BadValue(String),

    /// Gave up after this many consecutive failed connection attempts
    #[error("gave up after {0} connection attempts")]
    ReconnectExhausted(u32),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChainError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(io) => Self::Connect(io.to_string()),
            WsError::Tls(tls) => Self::Connect(tls.to_string()),
            WsError::Url(url) => Self::Connect(url.to_string()),
            WsError::Http(response) => Self::Connect(format!("HTTP {}", response.status())),
            other => Self::WebSocket(other.to_string()),
        }
    }
}
