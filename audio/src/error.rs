//! Error types for audio container handling.

use thiserror::Error;

/// Result type alias for audio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for audio container operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The byte stream does not look like an Ogg page where one was
    /// expected.
    #[error("invalid Ogg capture pattern at stream offset {0}")]
    BadCapture(u64),

    /// The stream carries no OpusHead where the Opus mapping requires
    /// one.
    #[error("missing OpusHead packet")]
    MissingOpusHead,

    /// An Opus packet too short to carry a TOC byte.
    #[error("empty Opus packet")]
    EmptyPacket,
}
