//! Container rewrap stage.
//!
//! A [`Rewrap`] takes raw provider bytes in one container and emits the
//! same codec packets in another. The registry only hands out the
//! packet-copy hot path where the containers alone differ; a codec pair
//! without an entry means the caller must ship bytes as they are (or
//! plug in a re-encoding adapter behind the same trait).

use tracing::debug;

use crate::error::{Error, Result};
use crate::ogg::OggPacketReader;
use crate::webm::{Block, WebmOpusMuxer};

/// Container formats the rewrap registry distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// Opus packets in Ogg pages.
    OggOpus,
    /// Opus packets in WebM clusters.
    WebmOpus,
    /// MP3 frames, self-framing.
    Mp3,
}

/// Incremental container translation.
pub trait Rewrap: Send {
    /// Feeds provider bytes; returns whatever output bytes are ready.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>>;

    /// Flushes any buffered output at end of stream.
    fn finish(&mut self) -> Result<Vec<u8>>;
}

/// Returns the rewrapper for a codec pair, or `None` when no packet-copy
/// path exists. Identical formats need no rewrapping.
pub fn rewrapper_for(from: ContainerFormat, to: ContainerFormat) -> Option<Box<dyn Rewrap>> {
    match (from, to) {
        (from, to) if from == to => Some(Box::new(Passthrough)),
        (ContainerFormat::OggOpus, ContainerFormat::WebmOpus) => {
            Some(Box::new(OggOpusToWebm::new()))
        }
        _ => None,
    }
}

/// The identity rewrap.
pub struct Passthrough;

impl Rewrap for Passthrough {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

enum OpusState {
    AwaitHead,
    AwaitTags,
    Streaming,
}

/// Ogg-Opus → WebM-Opus by packet copy.
///
/// Per-packet timestamps come from the Opus TOC byte; the decoder clock
/// is always 48 kHz.
pub struct OggOpusToWebm {
    reader: OggPacketReader,
    muxer: WebmOpusMuxer,
    state: OpusState,
    cursor_samples: u64,
}

impl Default for OggOpusToWebm {
    fn default() -> Self {
        Self::new()
    }
}

impl OggOpusToWebm {
    /// Creates a rewrapper expecting a fresh Ogg-Opus stream.
    pub fn new() -> Self {
        Self {
            reader: OggPacketReader::new(),
            muxer: WebmOpusMuxer::new(),
            state: OpusState::AwaitHead,
            cursor_samples: 0,
        }
    }

    fn drain(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut blocks: Vec<Block> = Vec::new();

        while let Some(packet) = self.reader.next_packet()? {
            match self.state {
                OpusState::AwaitHead => {
                    if !packet.data.starts_with(b"OpusHead") {
                        return Err(Error::MissingOpusHead);
                    }
                    let channels = *packet.data.get(9).unwrap_or(&1);
                    out.extend(self.muxer.header(&packet.data, channels));
                    self.state = OpusState::AwaitTags;
                }
                OpusState::AwaitTags => {
                    self.state = OpusState::Streaming;
                    if packet.data.starts_with(b"OpusTags") {
                        continue;
                    }
                    // Tolerate streams that skip the comment header.
                    self.collect_block(packet.data, &mut blocks)?;
                }
                OpusState::Streaming => {
                    self.collect_block(packet.data, &mut blocks)?;
                }
            }
        }

        if !blocks.is_empty() {
            // A cluster's relative timestamps are i16 milliseconds; split
            // long flushes well before the limit.
            let mut start = 0;
            for i in 1..blocks.len() {
                if blocks[i].0 - blocks[start].0 > 30_000 {
                    out.extend(self.muxer.cluster(&blocks[start..i]));
                    start = i;
                }
            }
            out.extend(self.muxer.cluster(&blocks[start..]));
        }
        Ok(out)
    }

    fn collect_block(&mut self, data: Vec<u8>, blocks: &mut Vec<Block>) -> Result<()> {
        let duration = opus_packet_duration(&data)?;
        let ms = self.cursor_samples / 48;
        self.cursor_samples += duration as u64;
        blocks.push((ms, data));
        Ok(())
    }
}

impl Rewrap for OggOpusToWebm {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        self.reader.push(chunk);
        self.drain()
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        let out = self.drain()?;
        if !self.reader.at_eos() {
            debug!("ogg stream ended without an EOS page");
        }
        Ok(out)
    }
}

/// Duration of one Opus packet in 48 kHz samples, derived from the TOC
/// byte (RFC 6716 §3.1).
fn opus_packet_duration(packet: &[u8]) -> Result<u32> {
    let toc = *packet.first().ok_or(Error::EmptyPacket)?;
    let config = toc >> 3;

    // Frame duration by configuration, in samples.
    let frame_samples: u32 = match config {
        0..=11 => match config % 4 {
            0 => 480,  // 10 ms
            1 => 960,  // 20 ms
            2 => 1920, // 40 ms
            _ => 2880, // 60 ms
        },
        12..=15 => {
            if config % 2 == 0 {
                480
            } else {
                960
            }
        }
        _ => match config % 4 {
            0 => 120, // 2.5 ms
            1 => 240, // 5 ms
            2 => 480, // 10 ms
            _ => 960, // 20 ms
        },
    };

    let frames = match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => packet.get(1).map(|&c| (c & 0x3F) as u32).unwrap_or(1),
    };

    Ok(frame_samples * frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::tests::packet_page;

    fn opus_head() -> Vec<u8> {
        let mut head = b"OpusHead".to_vec();
        head.push(1); // version
        head.push(1); // channels
        head.extend_from_slice(&[0x38, 0x01]); // pre-skip
        head.extend_from_slice(&48_000u32.to_le_bytes());
        head.extend_from_slice(&[0, 0]); // output gain
        head.push(0); // mapping family
        head
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_toc_durations() {
        // Config 31 (CELT 20 ms), code 0: one frame.
        assert_eq!(opus_packet_duration(&[0xFC, 0, 0]).unwrap(), 960);
        // Config 31, code 1: two frames.
        assert_eq!(opus_packet_duration(&[0xFD, 0, 0]).unwrap(), 1920);
        // Config 3 (SILK 60 ms), code 0.
        assert_eq!(opus_packet_duration(&[0x18, 0]).unwrap(), 2880);
        assert!(opus_packet_duration(&[]).is_err());
    }

    #[test]
    fn test_registry() {
        assert!(rewrapper_for(ContainerFormat::OggOpus, ContainerFormat::WebmOpus).is_some());
        assert!(rewrapper_for(ContainerFormat::Mp3, ContainerFormat::Mp3).is_some());
        // No packet-copy path between different codecs.
        assert!(rewrapper_for(ContainerFormat::Mp3, ContainerFormat::WebmOpus).is_none());
    }

    #[test]
    fn test_ogg_to_webm_packet_copy() {
        let mut rewrap = OggOpusToWebm::new();
        let audio_a = vec![0xFC, 0xAA, 0xBB];
        let audio_b = vec![0xFC, 0xCC, 0xDD];

        let mut stream = Vec::new();
        stream.extend(packet_page(9, 0, 0, &opus_head()));
        stream.extend(packet_page(9, 1, 0, b"OpusTags\x00\x00\x00\x00\x00\x00\x00\x00"));
        stream.extend(packet_page(9, 2, 960, &audio_a));
        stream.extend(packet_page(9, 3, 1920, &audio_b));

        let out = rewrap.push(&stream).unwrap();

        // WebM header with the OpusHead as CodecPrivate.
        assert_eq!(&out[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert!(find(&out, &opus_head()).is_some());
        // Audio packets are copied verbatim; the comment header is not.
        assert!(find(&out, &audio_a).is_some());
        assert!(find(&out, &audio_b).is_some());
        assert!(find(&out, b"OpusTags").is_none());
    }

    #[test]
    fn test_incremental_push() {
        let mut rewrap = OggOpusToWebm::new();

        let header_out = rewrap.push(&packet_page(9, 0, 0, &opus_head())).unwrap();
        assert!(!header_out.is_empty());

        let tags_out = rewrap
            .push(&packet_page(9, 1, 0, b"OpusTags\x00\x00\x00\x00"))
            .unwrap();
        assert!(tags_out.is_empty());

        let audio = vec![0xFC, 1, 2, 3];
        let audio_out = rewrap.push(&packet_page(9, 2, 960, &audio)).unwrap();
        assert!(find(&audio_out, &audio).is_some());
        assert!(rewrap.finish().unwrap().is_empty());
    }

    #[test]
    fn test_non_opus_stream_rejected() {
        let mut rewrap = OggOpusToWebm::new();
        let result = rewrap.push(&packet_page(9, 0, 0, b"vorbis-ish"));
        assert!(matches!(result, Err(Error::MissingOpusHead)));
    }
}
