//! Candidate partition enumeration for a time interval
//!
//! Walks `<collection>/<year>/<day>/` for every year and day the interval
//! touches and lists the window files present. Windows are filtered by
//! number only on the two edge days; interior days keep all of them.

use crate::partition::{parse_segment_file_name, WindowKey, MAX_DAY_OF_YEAR};
use crate::{Result, TimeRange};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Window coordinates of the interval bounds
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanBounds {
    pub start: WindowKey,
    pub end: WindowKey,
}

impl ScanBounds {
    pub fn from_range(range: &TimeRange) -> Result<Self> {
        Ok(Self {
            start: WindowKey::from_timestamp(range.start)?,
            end: WindowKey::from_timestamp(range.end)?,
        })
    }

    /// Window number filter, applied on the start and end days only
    pub fn excludes(&self, key: &WindowKey) -> bool {
        (key.same_day(&self.start) && key.window < self.start.window)
            || (key.same_day(&self.end) && key.window > self.end.window)
    }

    /// Day is the start or end day of the interval
    pub fn is_edge_day(&self, year: i32, day: u32) -> bool {
        (year == self.start.year && day == self.start.day)
            || (year == self.end.year && day == self.end.day)
    }

    fn day_bounds(&self, year: i32) -> (u32, u32) {
        let first = if year == self.start.year { self.start.day } else { 1 };
        let last = if year == self.end.year { self.end.day } else { MAX_DAY_OF_YEAR };
        (first, last)
    }
}

/// An existing day directory and its surviving window files
#[derive(Debug)]
pub(crate) struct DayPartitions {
    pub year: i32,
    pub day: u32,
    pub dir: PathBuf,
    /// Sorted by window number
    pub windows: Vec<(WindowKey, PathBuf)>,
}

/// Enumerate candidate segments of a collection, in calendar order
pub(crate) fn scan_partitions(
    collection_dir: &Path,
    bounds: &ScanBounds,
) -> Result<Vec<DayPartitions>> {
    let mut days = Vec::new();

    for year in bounds.start.year..=bounds.end.year {
        let year_dir = collection_dir.join(year.to_string());
        if !year_dir.is_dir() {
            continue;
        }

        let (first, last) = bounds.day_bounds(year);
        for day in first..=last {
            let day_dir = year_dir.join(day.to_string());
            let Some(windows) = list_windows(&day_dir, year, day, bounds)? else {
                continue;
            };
            days.push(DayPartitions {
                year,
                day,
                dir: day_dir,
                windows,
            });
        }
    }

    Ok(days)
}

/// List surviving window files of a day directory; `None` if it does not exist
fn list_windows(
    day_dir: &Path,
    year: i32,
    day: u32,
    bounds: &ScanBounds,
) -> Result<Option<Vec<(WindowKey, PathBuf)>>> {
    if !day_dir.is_dir() {
        return Ok(None);
    }
    let entries = match fs::read_dir(day_dir) {
        Ok(entries) => entries,
        // Removed by a concurrent delete
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut windows = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(window) = name.to_str().and_then(parse_segment_file_name) else {
            continue;
        };

        let key = WindowKey { year, day, window };
        if bounds.excludes(&key) {
            continue;
        }
        windows.push((key, entry.path()));
    }

    windows.sort_by_key(|(key, _)| key.window);
    Ok(Some(windows))
}
