//! Range read path

use super::scan::{scan_partitions, ScanBounds};
use crate::cache::SegmentCache;
use crate::{Pagination, Payload, Record, Result, TimeRange, Timestamp};
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// Reads a closed time interval across all overlapping segments
pub struct QueryEngine<'a> {
    collection_dir: &'a Path,
    cache: &'a SegmentCache,
}

impl<'a> QueryEngine<'a> {
    pub fn new(collection_dir: &'a Path, cache: &'a SegmentCache) -> Self {
        Self {
            collection_dir,
            cache,
        }
    }

    /// Records with `time` in `range`, ascending by time, then offset and
    /// limit applied.
    pub fn query(&self, range: TimeRange, page: Pagination) -> Result<Vec<Record>> {
        range.validate()?;
        page.validate()?;

        let bounds = ScanBounds::from_range(&range)?;
        let days = scan_partitions(self.collection_dir, &bounds)?;

        let mut hits: Vec<(Timestamp, Bytes)> = Vec::new();
        let mut segments = 0;
        for day in &days {
            for (_, path) in &day.windows {
                let data = self.cache.get_or_load(path)?;
                hits.extend(
                    data.range(range.start..=range.end)
                        .map(|(ts, value)| (*ts, value.clone())),
                );
                segments += 1;
            }
        }

        hits.sort_by_key(|(ts, _)| *ts);
        let total = hits.len();

        // Decode only what survives pagination
        let records: Vec<Record> = page
            .apply(hits)
            .into_iter()
            .map(|(time, value)| Record {
                time,
                data: Payload::from_stored(&value),
            })
            .collect();

        debug!(
            "Query [{}, {}] scanned {} segments, matched {}, returned {}",
            range.start,
            range.end,
            segments,
            total,
            records.len()
        );

        Ok(records)
    }
}
