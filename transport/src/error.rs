//! Error types for the streaming transport.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for transport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Frame metadata JSON exceeds the one-byte length prefix.
    #[error("frame metadata too large: {0} bytes (max 255)")]
    MetadataTooLarge(usize),

    /// Frame does not start with the expected magic bytes.
    #[error("bad frame magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Frame shorter than its declared layout.
    #[error("truncated frame: {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listener's outbound queue is full or its connection is gone.
    #[error("listener {0} unreachable")]
    ListenerGone(String),
}
