//! Segment encoding and decoding
//!
//! Format (all integers little-endian):
//! - 4 bytes: magic `SANS`
//! - 4 bytes: format version
//! - 8 bytes: entry count
//! - per entry, in strictly ascending timestamp order:
//!   - 8 bytes: timestamp (i64)
//!   - 4 bytes: payload length
//!   - N bytes: payload
//! - 4 bytes: CRC32 of everything above

use super::{SegmentData, FORMAT_VERSION, SEGMENT_MAGIC};
use crate::{Result, SanError, Timestamp};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const HEADER_SIZE: usize = 16;
const ENTRY_HEADER_SIZE: usize = 12;
const FOOTER_SIZE: usize = 4;

/// Binary codec for segment content
pub struct SegmentCodec;

impl SegmentCodec {
    /// Encode a segment mapping
    pub fn encode(data: &SegmentData) -> Bytes {
        let body: usize = data.values().map(|v| ENTRY_HEADER_SIZE + v.len()).sum();
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body + FOOTER_SIZE);

        buf.put_slice(SEGMENT_MAGIC);
        buf.put_u32_le(FORMAT_VERSION);
        buf.put_u64_le(data.len() as u64);

        for (ts, value) in data {
            buf.put_i64_le(*ts);
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(value);
        }

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);

        buf.freeze()
    }

    /// Decode a segment mapping. Either the whole mapping is returned or
    /// the input is rejected as corrupt.
    pub fn decode(data: &[u8]) -> Result<SegmentData> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(format!("segment too short: {} bytes", data.len())));
        }

        let (content, mut footer) = data.split_at(data.len() - FOOTER_SIZE);
        let expected = footer.get_u32_le();

        let mut cursor = content;
        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if &magic != SEGMENT_MAGIC {
            return Err(corrupt("invalid segment magic"));
        }

        let version = cursor.get_u32_le();
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported segment version: {}", version)));
        }

        let actual = crc32fast::hash(content);
        if expected != actual {
            return Err(corrupt(format!(
                "checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            )));
        }

        let count = cursor.get_u64_le();
        if count > (cursor.remaining() / ENTRY_HEADER_SIZE) as u64 {
            return Err(corrupt(format!("entry count {} exceeds segment size", count)));
        }

        let mut entries = SegmentData::new();
        let mut previous: Option<Timestamp> = None;

        for i in 0..count {
            if cursor.remaining() < ENTRY_HEADER_SIZE {
                return Err(corrupt(format!("truncated entry header at entry {}", i)));
            }
            let ts = cursor.get_i64_le();
            let len = cursor.get_u32_le() as usize;
            if cursor.remaining() < len {
                return Err(corrupt(format!("truncated payload at entry {}", i)));
            }

            if previous.is_some_and(|p| p >= ts) {
                return Err(corrupt(format!("timestamps out of order at entry {}", i)));
            }
            previous = Some(ts);

            let value = Bytes::copy_from_slice(&cursor[..len]);
            cursor.advance(len);
            entries.insert(ts, value);
        }

        if cursor.has_remaining() {
            return Err(corrupt(format!("{} trailing bytes", cursor.remaining())));
        }

        Ok(entries)
    }
}

fn corrupt(msg: impl Into<String>) -> SanError {
    SanError::CorruptSegment(msg.into())
}
