//! sanDB Core - windowed time-series segment store
//!
//! Records of a collection are bucketed into fixed 6-hour windows and kept
//! in one binary segment file per window:
//!
//! ```text
//! <data_dir>/<collection>/<year>/<day-of-year>/<window>.san
//! ```
//!
//! # Architecture
//!
//! - **Partition**: pure mapping from a millisecond timestamp to its window
//! - **Segment**: checksummed binary encoding of `timestamp -> payload bytes`
//! - **Cache**: bounded write-through cache of decoded segments with count
//!   and byte caps, enforced by a maintenance pass
//! - **Storage**: ingest, range query and range delete over the cache, plus
//!   collection directory lifecycle

pub mod cache;
pub mod partition;
pub mod segment;
pub mod storage;

mod error;
mod types;

pub use error::{Result, SanError};
pub use types::*;

/// sanDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    use std::time::Duration;

    /// Default data directory
    pub const DATA_DIR: &str = "data";

    /// Maximum number of cached segments
    pub const MAX_CACHED_SEGMENTS: usize = 1000;

    /// Maximum cached payload bytes (512MB)
    pub const MAX_CACHED_BYTES: u64 = 512 * 1024 * 1024;

    /// Period of the background eviction task
    pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);
}
