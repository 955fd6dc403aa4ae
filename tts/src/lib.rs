//! Streaming TTS provider adapters for lingcast.
//!
//! Every provider satisfies the same contract: a synthesis call returns a
//! [`TtsStream`]: a pull-based bounded channel of audio chunks with an
//! explicit cancel and a measured time-to-first-byte. A call moves
//! through Pending → FirstByte → Streaming and ends Done, Cancelled or
//! Failed; only the first two are clean exits.

pub mod elevenlabs;
pub mod error;
pub mod google;

pub use elevenlabs::ElevenLabsTts;
pub use error::{Error, Result};
pub use google::GoogleCloudTts;

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Depth of the chunk channel; back-pressure is realised by this bound.
pub const CHUNK_CHANNEL_DEPTH: usize = 32;

/// Audio encoding requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// MPEG layer III.
    Mp3,
    /// Opus in Ogg, as the provider emits it.
    OggOpus,
    /// Opus rewrapped into WebM on the way out of the adapter.
    WebmOpus,
    /// Uncompressed 16-bit PCM.
    Linear16,
}

impl AudioEncoding {
    /// Returns the encoding as a short string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::OggOpus => "ogg_opus",
            AudioEncoding::WebmOpus => "webm_opus",
            AudioEncoding::Linear16 => "linear16",
        }
    }
}

/// One synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Text to speak.
    pub text: String,
    /// Provider voice name or id.
    pub voice_name: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Provider model, when the route names one.
    pub model: Option<String>,
    /// Requested output encoding.
    pub encoding: AudioEncoding,
    /// Requested sample rate.
    pub sample_rate: u32,
}

/// Provider contract.
#[async_trait::async_trait]
pub trait TtsProvider: Send + Sync {
    /// Short provider name for logs and routing messages.
    fn name(&self) -> &'static str;

    /// Starts one synthesis, returning its chunk stream.
    async fn synthesize(&self, req: &SynthesisRequest) -> Result<TtsStream>;
}

/// The consumer half of one synthesis call.
pub struct TtsStream {
    chunks: mpsc::Receiver<Result<Bytes>>,
    cancel: CancellationToken,
    started: Instant,
    first_byte: Arc<OnceLock<Instant>>,
}

impl TtsStream {
    /// Receives the next audio chunk. `None` means the stream finished
    /// cleanly; an `Err` item means it failed and no more chunks follow.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        self.chunks.recv().await
    }

    /// Cancels the synthesis. The producer stops at its next suspension
    /// point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the cancellation token, for cancelling from another
    /// task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Milliseconds from synthesis start to the first audio byte, once
    /// one has arrived.
    pub fn time_to_first_byte_ms(&self) -> Option<u64> {
        self.first_byte
            .get()
            .map(|at| at.duration_since(self.started).as_millis() as u64)
    }
}

/// The producer half handed to adapter tasks.
pub struct TtsStreamSender {
    tx: mpsc::Sender<Result<Bytes>>,
    cancel: CancellationToken,
    first_byte: Arc<OnceLock<Instant>>,
}

impl TtsStreamSender {
    /// Sends one chunk, recording time-to-first-byte on the first call.
    /// Blocks when the consumer is behind (bounded channel).
    pub async fn send(&self, chunk: Bytes) -> Result<()> {
        let _ = self.first_byte.set(Instant::now());
        self.tx.send(Ok(chunk)).await.map_err(|_| Error::Cancelled)
    }

    /// Reports a failure and ends the stream.
    pub async fn fail(&self, err: Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// The token consumers cancel through.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the consumer asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Creates a connected producer/consumer pair.
pub fn stream_pair() -> (TtsStreamSender, TtsStream) {
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);
    let cancel = CancellationToken::new();
    let first_byte = Arc::new(OnceLock::new());

    (
        TtsStreamSender {
            tx,
            cancel: cancel.clone(),
            first_byte: first_byte.clone(),
        },
        TtsStream {
            chunks: rx,
            cancel,
            started: Instant::now(),
            first_byte,
        },
    )
}
