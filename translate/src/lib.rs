//! Realtime translation connection pool for lingcast.
//!
//! Serves translation requests for arbitrary (source, target) language
//! pairs over a pool of long-lived bi-directional sessions to a remote
//! realtime translation API. One session serves one language pair and at
//! most one in-flight response; the pool multiplexes requests across
//! sessions, correlates remote-assigned item ids back to callers, streams
//! partial deltas, and caches finished translations.

pub mod cache;
pub mod client;
pub mod error;
pub mod event;
pub mod pool;
pub mod session;
pub mod wire;

pub use client::{Connect, TranslateClient, TranslateClientBuilder};
pub use error::{Error, Result};
pub use pool::{PartialSink, PoolConfig, RequestClass, TranslationPool};
pub use wire::{Wire, WireSession};
