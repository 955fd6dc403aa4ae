//! JSON control channel messages.
//!
//! All control messages carry a `type` discriminator. Unknown types decode
//! to [`ClientMessage::Unknown`] so the connection is never closed over a
//! message we do not understand.

use serde::{Deserialize, Serialize};

/// Audio codec emitted to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// MPEG layer III.
    Mp3,
    /// Opus packets in a WebM container.
    OpusWebm,
    /// Opus packets in an Ogg container.
    OpusOgg,
    /// Raw little-endian 16-bit PCM.
    Pcm,
}

impl Codec {
    /// Returns the codec as a short string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Mp3 => "mp3",
            Codec::OpusWebm => "opus_webm",
            Codec::OpusOgg => "opus_ogg",
            Codec::Pcm => "pcm",
        }
    }

    /// Returns the MIME type for this codec.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Codec::Mp3 => "audio/mpeg",
            Codec::OpusWebm => "audio/webm; codecs=opus",
            Codec::OpusOgg => "audio/ogg; codecs=opus",
            Codec::Pcm => "audio/pcm",
        }
    }
}

/// Default negotiation preference order.
///
/// WebM-wrapped Opus leads because it is the native streaming emission of
/// the Opus-speaking providers; MP3 is the universal fallback.
pub const DEFAULT_CODEC_PREFERENCE: [Codec; 3] = [Codec::OpusWebm, Codec::Mp3, Codec::Pcm];

/// Listener capability descriptor, declared in `audio.hello`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Codecs the client can decode, in client preference order.
    #[serde(default)]
    pub codecs: Vec<Codec>,
    /// Highest sample rate the client will accept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sample_rate: Option<u32>,
}

/// Chooses a codec from the intersection of declared capabilities and the
/// server preference order. Server preference wins; returns `None` when the
/// intersection is empty.
pub fn negotiate(caps: &Capabilities, preference: &[Codec]) -> Option<Codec> {
    preference
        .iter()
        .copied()
        .find(|codec| caps.codecs.contains(codec))
}

/// Messages the core consumes from listener clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Capability negotiation, sent once after connect.
    #[serde(rename = "audio.hello", rename_all = "camelCase")]
    Hello {
        client_id: String,
        #[serde(default)]
        capabilities: Capabilities,
        #[serde(default)]
        desired_codec: Option<Codec>,
        #[serde(default)]
        desired_sample_rate: Option<u32>,
        #[serde(default)]
        target_lang: Option<String>,
    },

    /// Language subscription change. `lang: null` subscribes to all.
    #[serde(rename = "audio.set_lang", rename_all = "camelCase")]
    SetLang {
        client_id: String,
        #[serde(default)]
        lang: Option<String>,
    },

    /// Advisory delivery acknowledgement, consumed for diagnostics only.
    #[serde(rename = "audio.ack", rename_all = "camelCase")]
    Ack {
        stream_id: String,
        segment_id: String,
        chunk_index: u32,
    },

    /// Any message type we do not recognise. Logged and ignored.
    #[serde(other)]
    Unknown,
}

/// Per-segment routing information, surfaced to listeners for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingInfo {
    /// Provider chosen by the route resolver.
    pub provider: String,
    /// Voice tier.
    pub tier: String,
    /// Time from synthesis start to first audio byte, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,
}

/// Messages the core emits to listener clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `audio.hello`, sent exactly once.
    #[serde(rename = "audio.ready", rename_all = "camelCase")]
    Ready {
        stream_id: String,
        codec: Codec,
        sample_rate: u32,
        channels: u8,
        jitter_buffer_ms: u32,
    },

    /// Preamble for one segment's audio.
    #[serde(rename = "audio.start", rename_all = "camelCase")]
    Start {
        stream_id: String,
        segment_id: String,
        version: u32,
        seq_id: u64,
        lang: String,
        voice_id: String,
        text_preview: String,
        codec: Codec,
        routing: RoutingInfo,
    },

    /// Measured routing latency, emitted once the first byte arrives.
    #[serde(rename = "audio.routing", rename_all = "camelCase")]
    Routing {
        stream_id: String,
        segment_id: String,
        routing: RoutingInfo,
    },

    /// Segment completed successfully.
    #[serde(rename = "audio.end", rename_all = "camelCase")]
    End {
        stream_id: String,
        segment_id: String,
        version: u32,
    },

    /// Segment or session cancelled.
    #[serde(rename = "audio.cancel", rename_all = "camelCase")]
    Cancel {
        stream_id: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        segment_id: Option<String>,
    },

    /// Terminal error for a segment or the stream.
    #[serde(rename = "audio.error", rename_all = "camelCase")]
    Error {
        stream_id: String,
        error_code: ErrorCode,
        message: String,
    },

    /// Streaming translated-text delta for one language.
    #[serde(rename = "translation.delta", rename_all = "camelCase")]
    TranslationDelta {
        seq_id: u64,
        lang: String,
        text: String,
    },

    /// Final translated text for one language.
    #[serde(rename = "translation.done", rename_all = "camelCase")]
    TranslationDone {
        seq_id: u64,
        lang: String,
        text: String,
    },
}

/// The closed set of error codes a listener can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TierNotAllowed,
    VoiceNotAllowed,
    FeatureDisabled,
    SubscriptionInactive,
    InsufficientRole,
    StreamingError,
    TranslationTimeout,
    NoCompatibleCodec,
    InvalidRequest,
}

impl ErrorCode {
    /// Returns the code as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TierNotAllowed => "TIER_NOT_ALLOWED",
            ErrorCode::VoiceNotAllowed => "VOICE_NOT_ALLOWED",
            ErrorCode::FeatureDisabled => "FEATURE_DISABLED",
            ErrorCode::SubscriptionInactive => "SUBSCRIPTION_INACTIVE",
            ErrorCode::InsufficientRole => "INSUFFICIENT_ROLE",
            ErrorCode::StreamingError => "STREAMING_ERROR",
            ErrorCode::TranslationTimeout => "TRANSLATION_TIMEOUT",
            ErrorCode::NoCompatibleCodec => "NO_COMPATIBLE_CODEC",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip() {
        let json = r#"{
            "type": "audio.hello",
            "clientId": "c-1",
            "capabilities": {"codecs": ["opus_webm", "mp3"]},
            "targetLang": "es"
        }"#;

        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Hello {
                client_id,
                capabilities,
                target_lang,
                ..
            } => {
                assert_eq!(client_id, "c-1");
                assert_eq!(capabilities.codecs, vec![Codec::OpusWebm, Codec::Mp3]);
                assert_eq!(target_lang.as_deref(), Some("es"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_tolerated() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "audio.fancy_new_thing", "x": 1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn test_set_lang_null_means_all() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "audio.set_lang", "clientId": "c-1", "lang": null}"#)
                .unwrap();
        match msg {
            ClientMessage::SetLang { lang, .. } => assert!(lang.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_server_message_tag() {
        let msg = ServerMessage::End {
            stream_id: "s1:t".to_string(),
            segment_id: "s1:seg:1".to_string(),
            version: 1,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "audio.end");
        assert_eq!(json["segmentId"], "s1:seg:1");
    }

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_value(ErrorCode::NoCompatibleCodec).unwrap();
        assert_eq!(json, "NO_COMPATIBLE_CODEC");
        assert_eq!(ErrorCode::NoCompatibleCodec.as_str(), "NO_COMPATIBLE_CODEC");
    }

    #[test]
    fn test_negotiate_server_preference_wins() {
        let caps = Capabilities {
            codecs: vec![Codec::Mp3, Codec::OpusWebm],
            max_sample_rate: None,
        };
        assert_eq!(
            negotiate(&caps, &DEFAULT_CODEC_PREFERENCE),
            Some(Codec::OpusWebm)
        );
    }

    #[test]
    fn test_negotiate_empty_intersection() {
        let caps = Capabilities {
            codecs: vec![Codec::OpusOgg],
            max_sample_rate: None,
        };
        assert_eq!(negotiate(&caps, &DEFAULT_CODEC_PREFERENCE), None);
    }
}
