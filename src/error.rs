//! Error types for book synchronization and quote fusion

use thiserror::Error;

/// Market data and fusion errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Order book error: {0}")]
    OrderBookError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    /// Error-shaped payload returned by the venue instead of data
    #[error("Venue error {code}: {msg}")]
    VenueError { code: i64, msg: String },

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A diff was missed; the book must be rebuilt from a fresh snapshot
    #[error("Sequence gap: expected first update id <= {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("No gate event found within {pending} pending diffs")]
    GateOverflow { pending: usize },

    #[error("Snapshot request timed out")]
    SnapshotTimeout,

    #[error("No usable snapshot after {attempts} attempts")]
    SnapshotRetriesExhausted { attempts: u32 },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Hand-off channel closed")]
    ChannelClosed,
}

impl MarketDataError {
    /// True when the error invalidates the current book and requires a resync
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            MarketDataError::SequenceGap { .. } | MarketDataError::GateOverflow { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MarketDataError::SnapshotTimeout
        } else {
            MarketDataError::RestApiError(err.to_string())
        }
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::IpcError(err.to_string())
    }
}

impl From<config::ConfigError> for MarketDataError {
    fn from(err: config::ConfigError) -> Self {
        MarketDataError::ConfigError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MarketDataError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        MarketDataError::SerializationError(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::ConfigError(format!("metrics registration: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
