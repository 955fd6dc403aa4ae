//! Error types for TTS provider adapters.

use thiserror::Error;

/// Result type alias for TTS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for TTS operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request or body error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// gRPC status returned by the provider.
    #[error("grpc error: {0}")]
    Grpc(#[from] tonic::Status),

    /// gRPC transport failure.
    #[error("grpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Container rewrap failure.
    #[error("rewrap error: {0}")]
    Rewrap(#[from] lingcast_audio::Error),

    /// The provider rejected the request before streaming.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The synthesis was cancelled by its consumer.
    #[error("synthesis cancelled")]
    Cancelled,

    /// Invalid adapter configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
