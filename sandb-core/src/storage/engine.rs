//! Storage engine - top-level coordinator

use super::{
    CollectionStore, CreateOutcome, DeleteEngine, DeleteSummary, IngestSummary, QueryEngine,
    StorageConfig, WriteEngine,
};
use crate::cache::{CacheStats, EvictionReport, MaintenanceHandle, MaintenanceTrigger, SegmentCache};
use crate::{Pagination, Record, Result, TimeRange};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// sanDB storage engine
///
/// Owns the segment cache and hands it to the write, query and delete paths.
/// Collection names are validated and checked for existence here, before any
/// of those paths run.
///
/// Data operations hold `lifecycle` shared from the existence check until
/// they return; drop and rename hold it exclusively. A data operation thus
/// either completes before a collection goes away or sees it missing, and
/// no cache entry under a dropped or renamed directory can reappear.
pub struct StorageEngine {
    config: StorageConfig,
    collections: CollectionStore,
    cache: Arc<SegmentCache>,
    lifecycle: RwLock<()>,
}

impl StorageEngine {
    /// Create a new storage engine, creating the data directory if needed
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.cache.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let collections = CollectionStore::new(config.data_dir.clone());
        let cache = Arc::new(SegmentCache::new(config.cache.clone()));

        info!(
            "Storage engine opened at {:?} (cache: {} segments / {} bytes)",
            config.data_dir, config.cache.max_entries, config.cache.max_bytes
        );

        Ok(Self {
            config,
            collections,
            cache,
            lifecycle: RwLock::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn cache(&self) -> &Arc<SegmentCache> {
        &self.cache
    }

    /// Ingest records into a collection
    pub fn ingest(&self, collection: &str, records: &[Record]) -> Result<IngestSummary> {
        let summary = {
            let _guard = self.lifecycle.read();
            self.collections.require(collection)?;
            WriteEngine::new(self.data_dir(), &self.cache).ingest(collection, records)?
        };

        if self.config.cache.trigger == MaintenanceTrigger::AfterIngest {
            self.maintain();
        }

        Ok(summary)
    }

    /// Read a time interval of a collection
    pub fn query(
        &self,
        collection: &str,
        range: TimeRange,
        page: Pagination,
    ) -> Result<Vec<Record>> {
        let _guard = self.lifecycle.read();
        let dir = self.collections.require(collection)?;
        QueryEngine::new(&dir, &self.cache).query(range, page)
    }

    /// Delete a time interval of a collection
    pub fn delete_range(&self, collection: &str, range: TimeRange) -> Result<DeleteSummary> {
        let _guard = self.lifecycle.read();
        let dir = self.collections.require(collection)?;
        DeleteEngine::new(&dir, &self.cache).delete_range(range)
    }

    /// List all collections
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.collections.list()
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.collections.exists(name)
    }

    /// Create a collection
    pub fn create_collection(&self, name: &str) -> Result<CreateOutcome> {
        let outcome = self.collections.create(name)?;
        if outcome == CreateOutcome::Created {
            info!("Created collection: {}", name);
        }
        Ok(outcome)
    }

    /// Rename a collection. Cached segments of the old name are dropped first
    /// so no flush can recreate files under it.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        let _guard = self.lifecycle.write();
        let dir = self.collections.require(old)?;
        self.cache.invalidate_prefix(&dir);
        self.collections.rename(old, new)?;
        info!("Renamed collection: {} -> {}", old, new);
        Ok(())
    }

    /// Drop a collection and all of its segments
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let _guard = self.lifecycle.write();
        let dir = self.collections.require(name)?;
        let dropped = self.cache.invalidate_prefix(&dir);
        self.collections.remove(name)?;
        info!("Dropped collection: {} ({} cached segments released)", name, dropped);
        Ok(())
    }

    /// Run one eviction pass now
    pub fn maintain(&self) -> EvictionReport {
        let report = self.cache.run_maintenance();
        if report.total() > 0 {
            info!(
                "Evicted {} segments ({} by count, {} by size)",
                report.total(),
                report.by_count,
                report.by_size
            );
        }
        report
    }

    /// Start the background eviction task when configured with an interval.
    /// Must be called from within a tokio runtime.
    pub fn start_maintenance(&self) -> Option<MaintenanceHandle> {
        match self.config.cache.trigger {
            MaintenanceTrigger::Interval(period) => {
                Some(MaintenanceHandle::spawn(self.cache.clone(), period))
            }
            MaintenanceTrigger::AfterIngest => None,
        }
    }

    /// Persist every cached segment
    pub fn flush(&self) -> Result<usize> {
        self.cache.flush_all()
    }

    /// Get engine statistics
    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            collections: self.collections.list()?.len(),
            cache: self.cache.stats(),
        })
    }
}

/// Storage engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub collections: usize,
    pub cache: CacheStats,
}
