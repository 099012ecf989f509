//! Range delete path

use super::scan::{scan_partitions, ScanBounds};
use crate::cache::{RemoveOutcome, SegmentCache};
use crate::{Result, TimeRange};
use std::fs;
use std::path::Path;
use tracing::debug;

/// What a range delete changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Records removed
    pub removed: usize,
    /// Segment files rewritten with their remaining records
    pub rewritten: usize,
    /// Segment files deleted because they became empty
    pub deleted_files: usize,
    /// Interior day directories removed after becoming empty
    pub removed_dirs: usize,
}

/// Removes a closed time interval from every overlapping segment
pub struct DeleteEngine<'a> {
    collection_dir: &'a Path,
    cache: &'a SegmentCache,
}

impl<'a> DeleteEngine<'a> {
    pub fn new(collection_dir: &'a Path, cache: &'a SegmentCache) -> Self {
        Self {
            collection_dir,
            cache,
        }
    }

    /// Delete every record with `time` in `range`.
    ///
    /// Segments are processed in calendar order. A failure stops the walk;
    /// segments already rewritten stay rewritten.
    pub fn delete_range(&self, range: TimeRange) -> Result<DeleteSummary> {
        range.validate()?;

        let bounds = ScanBounds::from_range(&range)?;
        let days = scan_partitions(self.collection_dir, &bounds)?;
        let mut summary = DeleteSummary::default();

        for day in &days {
            for (_, path) in &day.windows {
                let outcome = self.cache.remove_range(path, &range)?;
                summary.removed += outcome.removed();
                match outcome {
                    RemoveOutcome::Unchanged => {}
                    RemoveOutcome::Rewritten { .. } => summary.rewritten += 1,
                    RemoveOutcome::Deleted { .. } => summary.deleted_files += 1,
                }
            }

            // Edge days may still hold records outside the interval
            if !bounds.is_edge_day(day.year, day.day) {
                match fs::remove_dir(&day.dir) {
                    Ok(()) => summary.removed_dirs += 1,
                    Err(e) => debug!("Keeping day directory {:?}: {}", day.dir, e),
                }
            }
        }

        debug!(
            "Delete [{}, {}] removed {} records ({} rewritten, {} files deleted)",
            range.start, range.end, summary.removed, summary.rewritten, summary.deleted_files
        );

        Ok(summary)
    }
}
