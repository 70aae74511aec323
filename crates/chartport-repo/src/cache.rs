//! In-memory catalog cache
//!
//! Two lookups fed by the scanner:
//! - artifact reference → chart record, so already-seen artifacts are not
//!   fetched and decoded again
//! - logical path → blob location, so downloads resolve without a scan
//!
//! Both maps sit behind one lock and are always written together, so an entry
//! never exists in one map without the other. Entries are never evicted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chart::{ArtifactRef, BlobLocation, ChartRecord, LogicalPath};

#[derive(Debug, Default)]
struct CacheMaps {
    records: HashMap<ArtifactRef, ChartRecord>,
    paths: HashMap<LogicalPath, BlobLocation>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub records: usize,
    pub paths: usize,
}

/// Concurrency-safe record and path cache
#[derive(Debug, Default)]
pub struct CatalogCache {
    maps: RwLock<CacheMaps>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheMaps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheMaps> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record previously decoded for an artifact
    pub fn record(&self, artifact: &ArtifactRef) -> Option<ChartRecord> {
        self.read().records.get(artifact).cloned()
    }

    /// Blob coordinates for a logical path
    pub fn locate(&self, path: &LogicalPath) -> Option<BlobLocation> {
        self.read().paths.get(path).cloned()
    }

    /// Whether downloads of this record's path are served from its own content layer
    pub fn serves(&self, record: &ChartRecord) -> bool {
        self.read()
            .paths
            .get(&record.logical_path())
            .is_some_and(|location| location.digest == record.content_digest)
    }

    /// Store a decoded record under both keys.
    ///
    /// A logical path keeps the first location bound to it. Returns `false`
    /// when the path was already bound to a different location.
    pub fn insert(
        &self,
        artifact: ArtifactRef,
        record: ChartRecord,
        location: BlobLocation,
    ) -> bool {
        let path = record.logical_path();
        let mut maps = self.write();

        let bound = maps.paths.entry(path).or_insert_with(|| location.clone());
        let consistent = *bound == location;
        maps.records.insert(artifact, record);
        consistent
    }

    /// Number of cached records and paths
    pub fn stats(&self) -> CacheStats {
        let maps = self.read();
        CacheStats {
            records: maps.records.len(),
            paths: maps.paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }
}
