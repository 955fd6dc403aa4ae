//! Listener handles.
//!
//! Each connected client owns a bounded outbound queue drained by its
//! socket writer task. Broadcast never blocks on a slow listener: a full
//! or closed queue marks the listener dead and it is evicted by the hub.

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::control::{Codec, ServerMessage};
use crate::error::{Error, Result};

/// Depth of the per-listener outbound queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// One outbound unit: a control message or an encoded audio frame.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// JSON control message.
    Control(ServerMessage),
    /// Encoded binary audio frame.
    Audio(Bytes),
}

/// A connected listener scoped to one session.
pub struct Listener {
    client_id: String,
    stream_id: String,
    codec: Codec,
    sample_rate: u32,
    lang: RwLock<Option<String>>,
    tx: mpsc::Sender<Outbound>,
}

impl Listener {
    /// Creates a listener and the receiving end of its outbound queue.
    ///
    /// The caller spawns a writer task that drains the receiver into the
    /// client socket.
    pub fn new(
        client_id: impl Into<String>,
        stream_id: impl Into<String>,
        codec: Codec,
        sample_rate: u32,
        lang: Option<String>,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (
            Self {
                client_id: client_id.into(),
                stream_id: stream_id.into(),
                codec,
                sample_rate,
                lang: RwLock::new(lang),
                tx,
            },
            rx,
        )
    }

    /// Returns the stable client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the allocated stream id.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Returns the negotiated codec.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the negotiated sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the currently subscribed language, `None` for all.
    pub fn lang(&self) -> Option<String> {
        self.lang.read().clone()
    }

    /// Updates the language subscription. Observed by the next broadcast;
    /// frames already queued are not recalled.
    pub fn set_lang(&self, lang: Option<String>) {
        *self.lang.write() = lang;
    }

    /// Returns true if a frame tagged with `tag` should reach this
    /// listener: the subscription matches, the subscription is null, or
    /// the frame carries no tag.
    pub fn wants(&self, tag: Option<&str>) -> bool {
        match tag {
            None => true,
            Some(lang) => match &*self.lang.read() {
                None => true,
                Some(subscribed) => subscribed == lang,
            },
        }
    }

    /// Enqueues one outbound unit without blocking.
    ///
    /// A full queue counts as a dead listener: the client is not draining
    /// its socket and delivery guarantees are already lost.
    pub fn send(&self, out: Outbound) -> Result<()> {
        self.tx
            .try_send(out)
            .map_err(|_| Error::ListenerGone(self.client_id.clone()))
    }
}
