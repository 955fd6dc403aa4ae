//! Usage event recording.
//!
//! One event per completed segment, keyed idempotently so retries never
//! double-bill. Recording failures are logged and never abort the
//! segment that produced them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure to persist a usage event.
#[derive(Error, Debug)]
#[error("usage sink error: {0}")]
pub struct UsageError(pub String);

/// One billable synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Idempotency key, `tts:{session}:{segment}:{hash}`.
    pub key: String,
    /// Session the segment belonged to.
    pub session_id: String,
    /// Segment identity.
    pub segment_id: String,
    /// Provider that synthesised it.
    pub provider: String,
    /// Voice tier.
    pub tier: String,
    /// Characters synthesised.
    pub characters: usize,
    /// Measured time to first byte, when available.
    pub ttfb_ms: Option<u64>,
}

/// Builds the idempotency key for one segment's synthesis.
pub fn usage_key(session_id: &str, segment_id: &str, text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hash = String::with_capacity(8);
    for byte in &digest[..4] {
        hash.push_str(&format!("{byte:02x}"));
    }
    format!("tts:{session_id}:{segment_id}:{hash}")
}

/// Destination for usage events.
#[async_trait::async_trait]
pub trait UsageSink: Send + Sync {
    /// Records one event. Recording the same key twice must yield a
    /// single persisted event.
    async fn record(&self, event: UsageEvent) -> Result<(), UsageError>;
}

/// In-memory sink, used in tests and as the development default.
#[derive(Default)]
pub struct MemoryUsageSink {
    events: parking_lot::Mutex<HashMap<String, UsageEvent>>,
}

impl MemoryUsageSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct persisted events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Looks up a persisted event by key.
    pub fn get(&self, key: &str) -> Option<UsageEvent> {
        self.events.lock().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl UsageSink for MemoryUsageSink {
    async fn record(&self, event: UsageEvent) -> Result<(), UsageError> {
        self.events.lock().entry(event.key.clone()).or_insert(event);
        Ok(())
    }
}
