//! Streaming transport for lingcast.
//!
//! Owns the wire protocol spoken to listener clients: a compact binary
//! framing for audio chunks, a JSON control channel, and the per-session
//! listener hub that performs language-scoped broadcast.

pub mod control;
pub mod error;
pub mod frame;
pub mod hub;
pub mod listener;

pub use control::{
    Capabilities, ClientMessage, Codec, DEFAULT_CODEC_PREFERENCE, ErrorCode, RoutingInfo,
    ServerMessage, negotiate,
};
pub use error::{Error, Result};
pub use frame::{AudioFrame, DEFAULT_MAGIC, FrameCodec, FrameMeta, MAX_META_LEN};
pub use hub::ListenerHub;
pub use listener::{Listener, OUTBOUND_QUEUE_DEPTH, Outbound};
