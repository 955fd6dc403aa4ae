//! Error types for route resolution.

use thiserror::Error;

use lingcast_transport::ErrorCode;

/// Result type alias for route operations.
pub type Result<T> = std::result::Result<T, RouteError>;

/// Route resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The caller's plan does not include the requested tier.
    #[error("tier not allowed: {0}")]
    TierNotAllowed(String),

    /// The requested voice is not available to the caller.
    #[error("voice not allowed: {0}")]
    VoiceNotAllowed(String),

    /// The request could not be understood (unknown tier, malformed voice
    /// selector, unmappable language).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The voice has no streaming-capable equivalent.
    #[error("streaming not implemented for voice {0}")]
    StreamingNotImplemented(String),
}

impl RouteError {
    /// Maps the failure to the wire error code a listener observes.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RouteError::TierNotAllowed(_) => ErrorCode::TierNotAllowed,
            RouteError::VoiceNotAllowed(_) => ErrorCode::VoiceNotAllowed,
            RouteError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            RouteError::StreamingNotImplemented(_) => ErrorCode::StreamingError,
        }
    }
}
