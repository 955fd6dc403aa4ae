//! Binary audio frame codec.
//!
//! Frame layout:
//!
//! ```text
//! offset  size   meaning
//! 0       4      magic (default "EXA1", ASCII)
//! 4       1      headerLen N (unsigned byte)
//! 5       N      metadata JSON (UTF-8)
//! 5+N     ...    audio payload (opaque)
//! ```
//!
//! The metadata JSON carries stream/segment identity and chunk ordering;
//! the payload is never inspected by the transport.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default frame magic.
pub const DEFAULT_MAGIC: [u8; 4] = *b"EXA1";

/// Maximum serialized metadata length (one-byte length prefix).
pub const MAX_META_LEN: usize = 255;

/// Frame metadata, serialized as JSON between header and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    /// Stream identity, allocated at listener negotiation.
    pub stream_id: String,
    /// Segment identity, `session:seg:N`.
    pub segment_id: String,
    /// Segment version, starts at 1.
    pub version: u32,
    /// Chunk ordinal within the segment, monotone from 0.
    pub chunk_index: u32,
    /// Exactly one frame per segment carries `true`; it is the last.
    pub is_last: bool,
}

/// One audio frame: metadata plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Frame metadata.
    pub meta: FrameMeta,
    /// Audio payload. May be empty on the terminal frame.
    pub payload: Bytes,
}

impl AudioFrame {
    /// Creates a terminal frame with an empty payload.
    pub fn last(stream_id: &str, segment_id: &str, version: u32, chunk_index: u32) -> Self {
        Self {
            meta: FrameMeta {
                stream_id: stream_id.to_string(),
                segment_id: segment_id.to_string(),
                version,
                chunk_index,
                is_last: true,
            },
            payload: Bytes::new(),
        }
    }
}

/// Binary frame encoder/decoder.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    magic: [u8; 4],
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC)
    }
}

impl FrameCodec {
    /// Creates a codec with the given magic.
    pub fn new(magic: [u8; 4]) -> Self {
        Self { magic }
    }

    /// Encodes a frame to wire bytes.
    ///
    /// Fails with `MetadataTooLarge` when the metadata JSON exceeds 255
    /// bytes; the payload size is unconstrained.
    pub fn encode(&self, frame: &AudioFrame) -> Result<Bytes> {
        let meta = serde_json::to_vec(&frame.meta)?;
        if meta.len() > MAX_META_LEN {
            return Err(Error::MetadataTooLarge(meta.len()));
        }

        let mut buf = BytesMut::with_capacity(5 + meta.len() + frame.payload.len());
        buf.put_slice(&self.magic);
        buf.put_u8(meta.len() as u8);
        buf.put_slice(&meta);
        buf.put_slice(&frame.payload);
        Ok(buf.freeze())
    }

    /// Decodes wire bytes to a frame.
    pub fn decode(&self, data: &[u8]) -> Result<AudioFrame> {
        if data.len() < 5 {
            return Err(Error::Truncated {
                got: data.len(),
                need: 5,
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != self.magic {
            return Err(Error::BadMagic(magic));
        }

        let meta_len = data[4] as usize;
        let need = 5 + meta_len;
        if data.len() < need {
            return Err(Error::Truncated {
                got: data.len(),
                need,
            });
        }

        let meta: FrameMeta = serde_json::from_slice(&data[5..need])?;
        Ok(AudioFrame {
            meta,
            payload: Bytes::copy_from_slice(&data[need..]),
        })
    }
}
