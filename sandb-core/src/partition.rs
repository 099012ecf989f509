//! Timestamp to partition mapping
//!
//! Every record lands in exactly one segment file, chosen purely from its
//! timestamp:
//!
//! ```text
//! <data_dir>/<collection>/<year>/<day-of-year>/<window>.san
//! ```
//!
//! A window is one of four 6-hour bands of a UTC calendar day:
//! `[00,06) -> 1`, `[06,12) -> 2`, `[12,18) -> 3`, `[18,24) -> 4`.

use crate::{Result, SanError, Timestamp};
use chrono::{Datelike, TimeZone, Timelike, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// Segment file extension
pub const SEGMENT_EXTENSION: &str = "san";

/// Width of one window in hours
pub const WINDOW_HOURS: u32 = 6;

/// Number of windows per day
pub const WINDOWS_PER_DAY: u32 = 24 / WINDOW_HOURS;

/// Upper bound used when iterating days of a year (leap or not)
pub const MAX_DAY_OF_YEAR: u32 = 366;

/// Calendar coordinates of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowKey {
    pub year: i32,
    /// Day of year, 1..=366
    pub day: u32,
    /// 6-hour window, 1..=4
    pub window: u32,
}

impl WindowKey {
    /// Derive the window containing `ts` (UTC)
    pub fn from_timestamp(ts: Timestamp) -> Result<Self> {
        if ts <= 0 {
            return Err(SanError::invalid(format!("timestamp must be positive, got {}", ts)));
        }
        let dt = Utc
            .timestamp_millis_opt(ts)
            .single()
            .ok_or_else(|| SanError::invalid(format!("timestamp out of range: {}", ts)))?;

        Ok(Self {
            year: dt.year(),
            day: dt.ordinal(),
            window: dt.hour() / WINDOW_HOURS + 1,
        })
    }

    /// Directory holding this window's segment
    pub fn day_dir(&self, collection_dir: &Path) -> PathBuf {
        collection_dir
            .join(self.year.to_string())
            .join(self.day.to_string())
    }

    /// Segment file path
    pub fn segment_path(&self, collection_dir: &Path) -> PathBuf {
        self.day_dir(collection_dir).join(segment_file_name(self.window))
    }

    /// Same calendar day as `other`
    pub fn same_day(&self, other: &WindowKey) -> bool {
        self.year == other.year && self.day == other.day
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.year, self.day, self.window)
    }
}

/// Fully resolved location of the segment that owns a timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAddress {
    pub key: WindowKey,
    pub path: PathBuf,
}

impl PartitionAddress {
    /// Locate the segment for `ts` within `collection` under `data_dir`.
    ///
    /// The collection name must already be validated by the caller.
    pub fn locate(data_dir: &Path, collection: &str, ts: Timestamp) -> Result<Self> {
        let key = WindowKey::from_timestamp(ts)?;
        let path = key.segment_path(&data_dir.join(collection));
        Ok(Self { key, path })
    }

    pub fn window(&self) -> u32 {
        self.key.window
    }
}

/// File name of a window's segment, e.g. `3.san`
pub fn segment_file_name(window: u32) -> String {
    format!("{}.{}", window, SEGMENT_EXTENSION)
}

/// Parse a segment file name back to its window number.
///
/// Anything that is not `<1..=4>.san` (temp files, stray files) yields `None`.
pub fn parse_segment_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    let window: u32 = stem.parse().ok()?;
    (1..=WINDOWS_PER_DAY).contains(&window).then_some(window)
}
