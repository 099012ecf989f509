//! Bounded write-through segment cache
//!
//! Decoded segments are kept in memory keyed by file path. Every read or
//! write that references a segment stamps it with a value from a
//! process-wide logical clock; eviction removes the least recently stamped
//! segments first.
//!
//! Two caps are enforced by [`SegmentCache::run_maintenance`], independently
//! of each other:
//! - `max_entries`: number of cached segments
//! - `max_bytes`: sum of payload byte lengths across all cached segments
//!
//! Both are soft: a single ingest may push the cache past them until the
//! next maintenance pass.
//!
//! # Locking
//!
//! The whole map sits behind one `RwLock`. Lookups of already cached
//! segments and `flush_all` take the shared lock. Loading a segment,
//! mutating its content, removing entries and eviction take the exclusive
//! lock, so a freshly loaded entry becomes visible fully populated.
//! Segment content is held in an `Arc` and mutated copy-on-write, which
//! lets readers keep a consistent snapshot after the lock is released.

mod maintenance;

pub use maintenance::MaintenanceHandle;

use crate::segment::{payload_size, read_segment, remove_segment, write_segment, SegmentData};
use crate::{Result, SanError, TimeRange, Timestamp};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// When the eviction passes run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTrigger {
    /// Background task on a fixed period
    Interval(Duration),
    /// Synchronously at the end of every successful ingest
    AfterIngest,
}

impl Default for MaintenanceTrigger {
    fn default() -> Self {
        MaintenanceTrigger::Interval(crate::config::MAINTENANCE_INTERVAL)
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached segments
    pub max_entries: usize,
    /// Maximum aggregate payload bytes
    pub max_bytes: u64,
    /// Eviction trigger
    pub trigger: MaintenanceTrigger,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::config::MAX_CACHED_SEGMENTS,
            max_bytes: crate::config::MAX_CACHED_BYTES,
            trigger: MaintenanceTrigger::default(),
        }
    }
}

impl CacheConfig {
    /// Reject caps that would evict everything and a zero period
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(SanError::Config("max_entries must be at least 1".into()));
        }
        if self.max_bytes == 0 {
            return Err(SanError::Config("max_bytes must be at least 1".into()));
        }
        if self.trigger == MaintenanceTrigger::Interval(Duration::ZERO) {
            return Err(SanError::Config("maintenance interval must be non-zero".into()));
        }
        Ok(())
    }
}

struct CacheEntry {
    data: Arc<SegmentData>,
    /// Payload bytes of `data`
    size: u64,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(data: SegmentData, tick: u64) -> Self {
        Self {
            size: payload_size(&data),
            data: Arc::new(data),
            last_access: AtomicU64::new(tick),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
    }

    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

/// Result of removing a time range from one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nothing in range; file untouched
    Unchanged,
    /// Entries removed, remaining content persisted
    Rewritten { removed: usize, remaining: usize },
    /// Segment became empty; file deleted and entry dropped
    Deleted { removed: usize },
}

impl RemoveOutcome {
    pub fn removed(&self) -> usize {
        match self {
            RemoveOutcome::Unchanged => 0,
            RemoveOutcome::Rewritten { removed, .. } | RemoveOutcome::Deleted { removed } => {
                *removed
            }
        }
    }
}

/// Entries evicted by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub by_count: usize,
    pub by_size: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.by_count + self.by_size
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Process-wide segment cache
pub struct SegmentCache {
    config: CacheConfig,
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SegmentCache {
    /// Create an empty cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the segment content, loading it from disk on first access.
    ///
    /// A segment whose file does not exist yet is cached as empty.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<SegmentData>> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(path) {
                entry.touch(self.tick());
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.data.clone());
            }
        }

        let mut entries = self.entries.write();
        let entry = self.load_locked(&mut entries, path)?;
        Ok(entry.data.clone())
    }

    /// Insert or overwrite a single value
    pub fn put(&self, path: &Path, ts: Timestamp, value: Bytes) -> Result<()> {
        self.merge(path, std::iter::once((ts, value))).map(|_| ())
    }

    /// Insert or overwrite a batch of values in one segment.
    /// Returns the number of values applied.
    pub fn merge<I>(&self, path: &Path, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (Timestamp, Bytes)>,
    {
        let mut entries = self.entries.write();
        let entry = self.load_locked(&mut entries, path)?;
        let data = Arc::make_mut(&mut entry.data);

        let mut applied = 0;
        for (ts, value) in values {
            entry.size += value.len() as u64;
            if let Some(old) = data.insert(ts, value) {
                entry.size -= old.len() as u64;
            }
            applied += 1;
        }

        Ok(applied)
    }

    /// Persist every cached segment, overwriting each file in full.
    ///
    /// Runs under the shared lock: no entry can change while its snapshot is
    /// encoded. Empty entries (segments that were looked up but never
    /// written) have no file and are skipped. Returns the number of files
    /// written.
    pub fn flush_all(&self) -> Result<usize> {
        let entries = self.entries.read();
        let mut written = 0;

        for (path, entry) in entries.iter() {
            if entry.data.is_empty() {
                continue;
            }
            write_segment(path, &entry.data)?;
            written += 1;
        }

        debug!("Flushed {} cached segments", written);
        Ok(written)
    }

    /// Remove every value in `range` from one segment and bring the file in
    /// line: rewrite it if values remain, delete it (and the entry) if not.
    ///
    /// If the file operation fails the entry is dropped so the next access
    /// reloads whatever is on disk.
    pub fn remove_range(&self, path: &Path, range: &TimeRange) -> Result<RemoveOutcome> {
        let mut entries = self.entries.write();
        let entry = self.load_locked(&mut entries, path)?;

        let doomed: Vec<Timestamp> = entry
            .data
            .range(range.start..=range.end)
            .map(|(ts, _)| *ts)
            .collect();

        if doomed.is_empty() {
            if entry.data.is_empty() {
                entries.remove(path);
            }
            return Ok(RemoveOutcome::Unchanged);
        }

        let data = Arc::make_mut(&mut entry.data);
        for ts in &doomed {
            if let Some(old) = data.remove(ts) {
                entry.size -= old.len() as u64;
            }
        }
        let remaining = data.len();

        let persisted = if remaining == 0 {
            remove_segment(path).map(|_| ())
        } else {
            write_segment(path, &entry.data).map(|_| ())
        };

        match persisted {
            Ok(()) if remaining == 0 => {
                entries.remove(path);
                Ok(RemoveOutcome::Deleted { removed: doomed.len() })
            }
            Ok(()) => Ok(RemoveOutcome::Rewritten {
                removed: doomed.len(),
                remaining,
            }),
            Err(e) => {
                warn!("Failed to persist range removal for {:?}: {}", path, e);
                entries.remove(path);
                Err(e)
            }
        }
    }

    /// Drop one entry. Returns whether it was cached.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.write().remove(path).is_some()
    }

    /// Drop every entry whose path lies under `prefix`
    pub fn invalidate_prefix(&self, prefix: &Path) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(prefix));
        before - entries.len()
    }

    /// Evict specific entries. Returns how many were present.
    pub fn evict(&self, paths: &[PathBuf]) -> usize {
        let mut entries = self.entries.write();
        let evicted = paths.iter().filter(|p| entries.remove(*p).is_some()).count();
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Apply the count cap, then the size cap, evicting least recently
    /// accessed segments first.
    pub fn run_maintenance(&self) -> EvictionReport {
        let mut entries = self.entries.write();
        let mut report = EvictionReport::default();

        if entries.len() > self.config.max_entries {
            let excess = entries.len() - self.config.max_entries;
            for path in lru_order(&entries).into_iter().take(excess) {
                debug!("Evicting {:?} (count cap)", path);
                entries.remove(&path);
                report.by_count += 1;
            }
        }

        let mut total: u64 = entries.values().map(|e| e.size).sum();
        if total > self.config.max_bytes {
            for path in lru_order(&entries) {
                if total <= self.config.max_bytes {
                    break;
                }
                if let Some(entry) = entries.remove(&path) {
                    debug!("Evicting {:?} (size cap, {} bytes)", path, entry.size);
                    total -= entry.size;
                    report.by_size += 1;
                }
            }
        }

        self.evictions.fetch_add(report.total() as u64, Ordering::Relaxed);
        report
    }

    /// Check whether a segment is cached
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    /// Number of cached segments
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of all cached segments, sorted
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            entries: entries.len(),
            bytes: entries.values().map(|e| e.size).sum(),
            max_entries: self.config.max_entries,
            max_bytes: self.config.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn load_locked<'a>(
        &self,
        entries: &'a mut HashMap<PathBuf, CacheEntry>,
        path: &Path,
    ) -> Result<&'a mut CacheEntry> {
        let tick = self.tick();
        match entries.entry(path.to_path_buf()) {
            Entry::Occupied(occupied) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let entry = occupied.into_mut();
                entry.touch(tick);
                Ok(entry)
            }
            Entry::Vacant(vacant) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let data = read_segment(path)?.unwrap_or_default();
                debug!("Loaded segment {:?} ({} entries)", path, data.len());
                Ok(vacant.insert(CacheEntry::new(data, tick)))
            }
        }
    }
}

/// Paths ordered by ascending last access, ties broken by path
fn lru_order(entries: &HashMap<PathBuf, CacheEntry>) -> Vec<PathBuf> {
    let mut order: Vec<(u64, &PathBuf)> = entries
        .iter()
        .map(|(path, entry)| (entry.last_access(), path))
        .collect();
    order.sort();
    order.into_iter().map(|(_, path)| path.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::read_segment;
    use std::fs;
    use tempfile::TempDir;

    fn cache(max_entries: usize, max_bytes: u64) -> SegmentCache {
        SegmentCache::new(CacheConfig {
            max_entries,
            max_bytes,
            trigger: MaintenanceTrigger::AfterIngest,
        })
    }

    fn value(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_get_or_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let path = temp_dir.path().join("1.san");

        let data = cache.get_or_load(&path).unwrap();
        assert!(data.is_empty());
        assert!(cache.contains(&path));
        assert!(!path.exists());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_put_overwrites_and_tracks_size() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let path = temp_dir.path().join("1.san");

        cache.put(&path, 1000, value("\"a\"")).unwrap();
        cache.put(&path, 1000, value("\"bb\"")).unwrap();

        let data = cache.get_or_load(&path).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[&1000], value("\"bb\""));
        assert_eq!(cache.stats().bytes, 4);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_writes() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let path = temp_dir.path().join("1.san");

        cache.put(&path, 1, value("1")).unwrap();
        let snapshot = cache.get_or_load(&path).unwrap();
        cache.put(&path, 2, value("2")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.get_or_load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_flush_all_matches_disk() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let a = temp_dir.path().join("2024/1/1.san");
        let b = temp_dir.path().join("2024/1/3.san");
        let untouched = temp_dir.path().join("2024/2/1.san");

        cache.put(&a, 10, value("10")).unwrap();
        cache.put(&b, 20, value("20")).unwrap();
        cache.get_or_load(&untouched).unwrap();

        assert_eq!(cache.flush_all().unwrap(), 2);
        for path in [&a, &b] {
            let on_disk = read_segment(path).unwrap().unwrap();
            assert_eq!(&on_disk, cache.get_or_load(path).unwrap().as_ref());
        }
        assert!(!untouched.exists());
    }

    #[test]
    fn test_loads_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1.san");
        let mut data = SegmentData::new();
        data.insert(5, value("5"));
        write_segment(&path, &data).unwrap();

        let cache = cache(10, 1 << 20);
        assert_eq!(cache.get_or_load(&path).unwrap().as_ref(), &data);
    }

    #[test]
    fn test_corrupt_file_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1.san");
        std::fs::write(&path, b"garbage").unwrap();

        let cache = cache(10, 1 << 20);
        assert!(cache.get_or_load(&path).unwrap_err().is_corruption());
        assert!(!cache.contains(&path));
        assert!(cache.put(&path, 1, value("1")).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
    }

    #[test]
    fn test_remove_range_rewrites_or_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let path = temp_dir.path().join("1.san");

        cache
            .merge(&path, [(100, value("a")), (200, value("b")), (300, value("c"))])
            .unwrap();
        cache.flush_all().unwrap();

        let outcome = cache.remove_range(&path, &TimeRange::new(150, 250)).unwrap();
        assert_eq!(outcome, RemoveOutcome::Rewritten { removed: 1, remaining: 2 });
        let on_disk = read_segment(&path).unwrap().unwrap();
        assert_eq!(on_disk.keys().copied().collect::<Vec<_>>(), vec![100, 300]);

        let outcome = cache.remove_range(&path, &TimeRange::new(400, 500)).unwrap();
        assert_eq!(outcome, RemoveOutcome::Unchanged);

        let outcome = cache.remove_range(&path, &TimeRange::new(1, 1000)).unwrap();
        assert_eq!(outcome, RemoveOutcome::Deleted { removed: 2 });
        assert!(!path.exists());
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_remove_range_failure_drops_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let rewrite = temp_dir.path().join("1.san");
        let delete = temp_dir.path().join("2.san");

        for path in [&rewrite, &delete] {
            cache.merge(path, [(100, value("a")), (200, value("b"))]).unwrap();
        }
        cache.flush_all().unwrap();

        // A non-empty directory where the file was: neither rename nor unlink succeeds
        for path in [&rewrite, &delete] {
            fs::remove_file(path).unwrap();
            fs::create_dir_all(path.join("occupied")).unwrap();
        }

        let err = cache.remove_range(&rewrite, &TimeRange::new(150, 250)).unwrap_err();
        assert!(matches!(err, SanError::Io(_)));
        assert!(!cache.contains(&rewrite));

        let err = cache.remove_range(&delete, &TimeRange::new(1, 1000)).unwrap_err();
        assert!(matches!(err, SanError::Io(_)));
        assert!(!cache.contains(&delete));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_count_cap_evicts_least_recent() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(1, 1 << 20);
        let old = temp_dir.path().join("1.san");
        let recent = temp_dir.path().join("2.san");

        cache.put(&old, 1, value("1")).unwrap();
        cache.put(&recent, 2, value("2")).unwrap();

        let report = cache.run_maintenance();
        assert_eq!(report, EvictionReport { by_count: 1, by_size: 0 });
        assert_eq!(cache.cached_paths(), vec![recent]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(1, 1 << 20);
        let first = temp_dir.path().join("1.san");
        let second = temp_dir.path().join("2.san");

        cache.put(&first, 1, value("1")).unwrap();
        cache.put(&second, 2, value("2")).unwrap();
        cache.get_or_load(&first).unwrap();

        cache.run_maintenance();
        assert_eq!(cache.cached_paths(), vec![first]);
    }

    #[test]
    fn test_size_cap_evicts_until_within_budget() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(100, 10);
        let paths: Vec<_> = (1..=3).map(|i| temp_dir.path().join(format!("{}.san", i))).collect();

        // 6 bytes each, 18 total
        for (i, path) in paths.iter().enumerate() {
            cache.put(path, i as i64 + 1, value("123456")).unwrap();
        }

        let report = cache.run_maintenance();
        assert_eq!(report, EvictionReport { by_count: 0, by_size: 2 });
        assert_eq!(cache.cached_paths(), vec![paths[2].clone()]);
        assert_eq!(cache.stats().bytes, 6);
    }

    #[test]
    fn test_invalidate_and_evict() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(10, 1 << 20);
        let a = temp_dir.path().join("alpha/2024/1/1.san");
        let b = temp_dir.path().join("alpha/2024/1/2.san");
        let c = temp_dir.path().join("beta/2024/1/1.san");

        for path in [&a, &b, &c] {
            cache.put(path, 1, value("1")).unwrap();
        }

        assert!(cache.invalidate(&a));
        assert!(!cache.invalidate(&a));
        assert_eq!(cache.invalidate_prefix(&temp_dir.path().join("alpha")), 1);
        assert_eq!(cache.evict(&[c.clone(), a.clone()]), 1);
        assert!(cache.is_empty());
    }
}
