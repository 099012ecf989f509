//! Ingest path

use crate::cache::SegmentCache;
use crate::partition::PartitionAddress;
use crate::{Record, Result, SanError, Timestamp};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What an ingest call touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Records applied
    pub records: usize,
    /// Distinct segments the records landed in
    pub segments: usize,
    /// Segment files written by the final flush
    pub flushed: usize,
}

/// Groups records by partition, merges them into the cache and flushes
pub struct WriteEngine<'a> {
    data_dir: &'a Path,
    cache: &'a SegmentCache,
}

impl<'a> WriteEngine<'a> {
    pub fn new(data_dir: &'a Path, cache: &'a SegmentCache) -> Self {
        Self { data_dir, cache }
    }

    /// Ingest records into an existing collection.
    ///
    /// Every record is validated before anything is touched; the first bad
    /// one fails the call with `InvalidInput`. Once merging starts, a
    /// persistence failure is returned as is and in-memory changes stay (the
    /// next successful flush writes them).
    ///
    /// On success, every cached segment, not only the ones touched here, is
    /// on disk exactly as it is in memory.
    pub fn ingest(&self, collection: &str, records: &[Record]) -> Result<IngestSummary> {
        let groups = self.group_by_partition(collection, records)?;
        let segments = groups.len();

        for (path, values) in groups {
            self.cache.merge(&path, values)?;
        }

        let flushed = self.cache.flush_all()?;
        debug!(
            "Ingested {} records into {} segments of '{}'",
            records.len(),
            segments,
            collection
        );

        Ok(IngestSummary {
            records: records.len(),
            segments,
            flushed,
        })
    }

    fn group_by_partition(
        &self,
        collection: &str,
        records: &[Record],
    ) -> Result<BTreeMap<PathBuf, Vec<(Timestamp, Bytes)>>> {
        let mut groups: BTreeMap<PathBuf, Vec<(Timestamp, Bytes)>> = BTreeMap::new();

        for (i, record) in records.iter().enumerate() {
            let address = PartitionAddress::locate(self.data_dir, collection, record.time)
                .map_err(|e| at_record(i, e))?;
            let value = record
                .data
                .to_stored()
                .map_err(|e| at_record(i, e))?;

            groups
                .entry(address.path)
                .or_default()
                .push((record.time, Bytes::from(value)));
        }

        Ok(groups)
    }
}

fn at_record(index: usize, err: SanError) -> SanError {
    match err {
        SanError::InvalidInput(msg) => SanError::invalid(format!("record {}: {}", index, msg)),
        other => other,
    }
}
