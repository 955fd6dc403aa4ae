//! Audio container rewrapping for lingcast.
//!
//! Providers whose native wire format is Opus-in-Ogg are re-delivered to
//! listeners as Opus-in-WebM. Only the container changes: packets are
//! copied, never decoded or re-encoded, so the stage is cheap enough for
//! the synthesis hot path.

pub mod error;
pub mod ogg;
pub mod rewrap;
pub mod webm;

pub use error::{Error, Result};
pub use ogg::{OggPacket, OggPacketReader};
pub use rewrap::{ContainerFormat, OggOpusToWebm, Passthrough, Rewrap, rewrapper_for};
pub use webm::WebmOpusMuxer;
