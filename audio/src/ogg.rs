//! Incremental Ogg packet reader.
//!
//! Accepts the byte stream in arbitrary chunks and yields complete
//! packets, reassembling packets that continue across page boundaries.

use tracing::warn;

use crate::error::{Error, Result};

/// Magic bytes of an Ogg page header.
const OGG_MAGIC: &[u8] = b"OggS";

/// Fixed page header size before the segment table.
const PAGE_HEADER_SIZE: usize = 27;

/// Header type flags.
mod flags {
    /// Continuation of the previous page's last packet.
    pub const CONTINUATION: u8 = 0x01;
    /// End of stream.
    pub const EOS: u8 = 0x04;
}

/// One complete packet extracted from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPacket {
    /// Packet payload.
    pub data: Vec<u8>,
    /// Granule position of the page the packet completed on.
    pub granule: i64,
    /// Stream serial number.
    pub serial: u32,
}

/// Streaming Ogg packet reader.
#[derive(Default)]
pub struct OggPacketReader {
    buf: Vec<u8>,
    /// Packet bytes carried over from a page that ended mid-packet.
    partial: Vec<u8>,
    partial_active: bool,
    ready: std::collections::VecDeque<OggPacket>,
    consumed: u64,
    eos: bool,
}

impl OggPacketReader {
    /// Creates an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw container bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns true once an end-of-stream page has been parsed.
    pub fn at_eos(&self) -> bool {
        self.eos
    }

    /// Yields the next complete packet, or `None` until more bytes
    /// arrive.
    pub fn next_packet(&mut self) -> Result<Option<OggPacket>> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(Some(packet));
            }
            if !self.parse_page()? {
                return Ok(None);
            }
        }
    }

    /// Parses one page out of the buffer. Returns false when the buffer
    /// does not yet hold a complete page.
    fn parse_page(&mut self) -> Result<bool> {
        if self.buf.len() < PAGE_HEADER_SIZE {
            return Ok(false);
        }
        if &self.buf[..4] != OGG_MAGIC {
            return Err(Error::BadCapture(self.consumed));
        }

        let header_type = self.buf[5];
        let granule = i64::from_le_bytes(self.buf[6..14].try_into().unwrap());
        let serial = u32::from_le_bytes(self.buf[14..18].try_into().unwrap());
        let n_segments = self.buf[26] as usize;

        let table_end = PAGE_HEADER_SIZE + n_segments;
        if self.buf.len() < table_end {
            return Ok(false);
        }
        let body_size: usize = self.buf[PAGE_HEADER_SIZE..table_end]
            .iter()
            .map(|&v| v as usize)
            .sum();
        let page_end = table_end + body_size;
        if self.buf.len() < page_end {
            return Ok(false);
        }

        if self.partial_active && header_type & flags::CONTINUATION == 0 {
            warn!("dropping unterminated packet: page is not a continuation");
            self.partial.clear();
            self.partial_active = false;
        }

        let mut offset = table_end;
        for i in 0..n_segments {
            let lacing = self.buf[PAGE_HEADER_SIZE + i] as usize;
            self.partial
                .extend_from_slice(&self.buf[offset..offset + lacing]);
            offset += lacing;

            if lacing < 255 {
                self.ready.push_back(OggPacket {
                    data: std::mem::take(&mut self.partial),
                    granule,
                    serial,
                });
                self.partial_active = false;
            } else {
                self.partial_active = true;
            }
        }

        if header_type & flags::EOS != 0 {
            self.eos = true;
        }
        self.consumed += page_end as u64;
        self.buf.drain(..page_end);
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds one Ogg page from explicit lacing values and body.
    pub(crate) fn build_page(
        serial: u32,
        sequence: u32,
        granule: i64,
        header_type: u8,
        lacing: &[u8],
        body: &[u8],
    ) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(OGG_MAGIC);
        page.push(0); // version
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes()); // checksum unchecked
        page.push(lacing.len() as u8);
        page.extend_from_slice(lacing);
        page.extend_from_slice(body);
        page
    }

    /// Builds a single-packet page (packet shorter than 255 bytes).
    pub(crate) fn packet_page(serial: u32, sequence: u32, granule: i64, packet: &[u8]) -> Vec<u8> {
        assert!(packet.len() < 255);
        build_page(serial, sequence, granule, 0, &[packet.len() as u8], packet)
    }

    #[test]
    fn test_single_packet() {
        let mut reader = OggPacketReader::new();
        reader.push(&packet_page(7, 0, 960, b"hello-opus"));

        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.data, b"hello-opus");
        assert_eq!(packet.granule, 960);
        assert_eq!(packet.serial, 7);
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_incremental_delivery() {
        let page = packet_page(7, 0, 960, b"chunked");
        let mut reader = OggPacketReader::new();

        // Byte at a time: no packet until the page completes.
        for (i, byte) in page.iter().enumerate() {
            reader.push(&[*byte]);
            let packet = reader.next_packet().unwrap();
            if i < page.len() - 1 {
                assert!(packet.is_none());
            } else {
                assert_eq!(packet.unwrap().data, b"chunked");
            }
        }
    }

    #[test]
    fn test_packet_spanning_pages() {
        // A 300-byte packet: lacing [255, 45] across two pages.
        let payload: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        let first = build_page(7, 0, -1, 0, &[255], &payload[..255]);
        let second = build_page(7, 1, 1920, super::flags::CONTINUATION, &[45], &payload[255..]);

        let mut reader = OggPacketReader::new();
        reader.push(&first);
        assert!(reader.next_packet().unwrap().is_none());

        reader.push(&second);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.data, payload);
        assert_eq!(packet.granule, 1920);
    }

    #[test]
    fn test_multiple_packets_one_page() {
        let body: Vec<u8> = [b"aa".as_slice(), b"bbb".as_slice()].concat();
        let page = build_page(7, 0, 960, 0, &[2, 3], &body);

        let mut reader = OggPacketReader::new();
        reader.push(&page);
        assert_eq!(reader.next_packet().unwrap().unwrap().data, b"aa");
        assert_eq!(reader.next_packet().unwrap().unwrap().data, b"bbb");
    }

    #[test]
    fn test_eos_flag() {
        let mut reader = OggPacketReader::new();
        reader.push(&build_page(7, 2, 2880, super::flags::EOS, &[1], b"x"));
        reader.next_packet().unwrap().unwrap();
        assert!(reader.at_eos());
    }

    #[test]
    fn test_garbage_rejected() {
        let mut reader = OggPacketReader::new();
        reader.push(&[0u8; 64]);
        assert!(matches!(
            reader.next_packet(),
            Err(Error::BadCapture(0))
        ));
    }
}
