//! Storage engine - coordinates partitioning, the segment cache and the
//! write / query / delete paths

mod collection;
mod delete;
mod engine;
mod query;
mod scan;
mod write;

pub use collection::{validate_collection_name, CollectionStore, CreateOutcome};
pub use delete::{DeleteEngine, DeleteSummary};
pub use engine::{EngineStats, StorageEngine};
pub use query::QueryEngine;
pub use write::{IngestSummary, WriteEngine};

use crate::cache::CacheConfig;
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory holding one sub-directory per collection
    pub data_dir: PathBuf,
    /// Segment cache configuration
    pub cache: CacheConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(crate::config::DATA_DIR),
            cache: CacheConfig::default(),
        }
    }
}
