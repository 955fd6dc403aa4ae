//! Committed and queued segment types.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A finalised chunk of text from the upstream speech pipeline.
///
/// Immutable once created. `seq_id` reflects the order in which segments
/// were committed upstream and is monotone per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedSegment {
    /// Monotone per-session commit ordinal.
    pub seq_id: u64,
    /// The committed text.
    pub text: String,
    /// Source language of the text.
    pub source_lang: String,
    /// Language to synthesise audio in.
    pub target_lang: String,
    /// Requested voice selector, `provider:tier:engine:voiceName` or a
    /// bare voice name.
    pub voice_request: String,
    /// Whether the upstream considers this segment final.
    pub is_final: bool,
}

/// A committed segment augmented by the orchestrator with stream identity.
#[derive(Debug, Clone)]
pub struct QueuedSegment {
    /// The underlying committed segment.
    pub segment: CommittedSegment,
    /// `session:seg:N`, N monotone per session.
    pub segment_id: String,
    /// Starts at 1.
    pub version: u32,
    /// When the segment entered the queue.
    pub enqueued_at: Instant,
}

impl QueuedSegment {
    /// Builds the segment id for ordinal `n` within `session_id`.
    pub fn segment_id_for(session_id: &str, n: u64) -> String {
        format!("{session_id}:seg:{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id_format() {
        assert_eq!(QueuedSegment::segment_id_for("s1", 4), "s1:seg:4");
    }

    #[test]
    fn test_committed_segment_wire_names() {
        let json = r#"{
            "seqId": 1,
            "text": "Hello",
            "sourceLang": "en",
            "targetLang": "es",
            "voiceRequest": "elevenlabs:elevenlabs_flash:-:3qAbeQHx5LFO5BGhoRFu",
            "isFinal": true
        }"#;
        let seg: CommittedSegment = serde_json::from_str(json).unwrap();
        assert_eq!(seg.seq_id, 1);
        assert_eq!(seg.target_lang, "es");
        assert!(seg.is_final);
    }
}
