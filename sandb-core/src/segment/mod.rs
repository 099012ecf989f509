//! Segment files
//!
//! A segment holds every record of one collection whose timestamp falls in a
//! single 6-hour window. On disk it is a self-describing, checksummed binary
//! mapping of timestamp to payload bytes; in memory it is a sorted map.

mod codec;
mod file;

pub use codec::SegmentCodec;
pub use file::{read_segment, remove_segment, write_segment};

use crate::Timestamp;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Segment file magic
pub const SEGMENT_MAGIC: &[u8; 4] = b"SANS";

/// Segment file format version
pub const FORMAT_VERSION: u32 = 1;

/// Decoded segment content: timestamp -> stored payload bytes
pub type SegmentData = BTreeMap<Timestamp, Bytes>;

/// Aggregate payload size of a segment, as counted against the cache byte cap
pub fn payload_size(data: &SegmentData) -> u64 {
    data.values().map(|v| v.len() as u64).sum()
}
