//! Error types for the translation pool.

use thiserror::Error;

/// Result type alias for translation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for translation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to establish or maintain the wire connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error event returned by the remote.
    #[error("remote error: {0}")]
    Remote(String),

    /// The session closed while the request was pending.
    #[error("session closed")]
    SessionClosed,

    /// The request did not resolve within its timeout budget.
    #[error("translation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request was cancelled by its caller.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true when the failure is worth retrying on a fresh
    /// session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::WebSocket(_) | Error::SessionClosed
        )
    }
}
