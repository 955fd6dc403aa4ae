//! Route resolution for lingcast.
//!
//! Maps a requested (tier, voice, language) tuple and the caller's
//! entitlement snapshot to a concrete provider + voice + codec decision.
//! Resolution is a pure function of its inputs: static tables, no I/O.

pub mod error;
pub mod locale;
pub mod resolver;
pub mod tier;
pub mod voice;

pub use error::{Result, RouteError};
pub use locale::normalize_language;
pub use resolver::{RouteDecision, RouteMode, RouteRequest, resolve};
pub use tier::{Provider, Tier};
pub use voice::VoiceSelector;
