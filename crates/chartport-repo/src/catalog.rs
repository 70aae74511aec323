//! Catalog service
//!
//! [`Catalog`] owns the registry handle and the cache. It is the only type the
//! serving layer talks to, typically shared behind an `Arc`.

use futures::TryStreamExt;
use std::sync::Arc;

use crate::cache::{CacheStats, CatalogCache};
use crate::chart::ChartRecord;
use crate::config::{RegistryOptions, ScanPolicy};
use crate::connector;
use crate::error::Result;
use crate::index::{RepositoryIndex, build_index};
use crate::registry::{BlobStream, RegistryClient};
use crate::resolver::BlobResolver;
use crate::scanner::CatalogScanner;

/// Chart catalog over one registry
pub struct Catalog {
    registry: Arc<dyn RegistryClient>,
    cache: CatalogCache,
    policy: ScanPolicy,
    registry_url: Option<String>,
}

impl Catalog {
    /// Catalog over an already connected registry client
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            cache: CatalogCache::new(),
            policy: ScanPolicy::default(),
            registry_url: None,
        }
    }

    pub fn with_policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect to an OCI registry and build a catalog over it
    pub async fn connect(options: RegistryOptions, policy: ScanPolicy) -> Result<Self> {
        let connection = connector::connect(options).await?;
        let url = connection.options.url.clone();

        let mut catalog = Self::new(Arc::new(connection.registry)).with_policy(policy);
        catalog.registry_url = Some(url);
        Ok(catalog)
    }

    /// URL of the registry, when connected through [`Catalog::connect`]
    pub fn registry_url(&self) -> Option<&str> {
        self.registry_url.as_deref()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Walk the registry and return every chart found, in scan order
    pub async fn scan(&self) -> Result<Vec<ChartRecord>> {
        CatalogScanner::new(self.registry.as_ref(), &self.cache)
            .with_policy(self.policy)
            .scan_all()
            .await
    }

    /// Rescan the registry and build a fresh index.
    ///
    /// Only records whose content layer is the one served for their chart path
    /// are listed, so index digests always describe the bytes downloaded.
    pub async fn index(&self) -> Result<RepositoryIndex> {
        let mut records = self.scan().await?;
        records.retain(|record| {
            let served = self.cache.serves(record);
            if !served {
                tracing::warn!(
                    chart = %record.name,
                    version = %record.version,
                    digest = %record.content_digest,
                    "Chart version shadowed by an earlier artifact, leaving it out of the index"
                );
            }
            served
        });
        Ok(build_index(&records))
    }

    /// Stream the archive behind a chart path
    pub async fn open_chart(&self, path: &str) -> Result<BlobStream> {
        BlobResolver::new(self.registry.as_ref(), &self.cache)
            .resolve_and_stream(path)
            .await
    }

    /// Read a whole chart archive into memory
    pub async fn chart_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let stream = self.open_chart(path).await?;
        stream
            .try_fold(Vec::new(), |mut data, chunk| async move {
                data.extend_from_slice(&chunk);
                Ok(data)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use crate::mock::{MockFailure, MockRegistry};
    use crate::registry::compute_digest;

    fn chart(name: &str, version: &str) -> ChartRecord {
        let mut record = ChartRecord::new(name, version);
        record.api_version = "v2".to_string();
        record.app_version = "1.25.0".to_string();
        record
    }

    fn demo_catalog() -> (MockRegistry, Catalog) {
        let registry = MockRegistry::new();
        registry.push_chart("demo", "1.0.0", &chart("demo", "1.0.0"), b"demo-1.0.0-archive");
        registry.push_chart("demo", "1.1.0", &chart("demo", "1.1.0"), b"demo-1.1.0-archive");
        let catalog = Catalog::new(Arc::new(registry.clone()));
        (registry, catalog)
    }

    #[tokio::test]
    async fn test_demo_scenario() {
        let (_, catalog) = demo_catalog();

        let records = catalog.scan().await.unwrap();
        assert_eq!(records.len(), 2);

        let index = catalog.index().await.unwrap();
        assert_eq!(index.names(), vec!["demo"]);
        let urls: Vec<_> = index.get("demo").unwrap().iter().flat_map(|v| v.urls.clone()).collect();
        assert_eq!(urls, vec!["charts/demo-1.0.0.tgz", "charts/demo-1.1.0.tgz"]);

        let bytes = catalog.chart_bytes("demo-1.0.0").await.unwrap();
        assert_eq!(bytes, b"demo-1.0.0-archive");
    }

    #[tokio::test]
    async fn test_index_is_stable_across_scans() {
        let (registry, catalog) = demo_catalog();

        let first = catalog.index().await.unwrap();
        let second = catalog.index().await.unwrap();
        assert_eq!(first.entries, second.entries);

        // Two config downloads for the first scan, none for the second
        assert_eq!(registry.operation_counts().blob_downloads, 2);
    }

    #[tokio::test]
    async fn test_index_picks_up_new_tags() {
        let (registry, catalog) = demo_catalog();
        catalog.index().await.unwrap();

        registry.push_chart("demo", "1.2.0", &chart("demo", "1.2.0"), b"demo-1.2.0-archive");
        let index = catalog.index().await.unwrap();
        assert_eq!(index.get("demo").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_private_repository_is_skipped() {
        let (registry, catalog) = demo_catalog();
        registry.fail_tags("private", MockFailure::Unauthorized);

        let index = catalog.index().await.unwrap();
        assert_eq!(index.names(), vec!["demo"]);
    }

    #[tokio::test]
    async fn test_chart_before_scan_is_not_found() {
        let (_, catalog) = demo_catalog();

        let result = catalog.chart_bytes("demo-1.0.0.tgz").await;
        assert!(matches!(result, Err(RepoError::ChartNotFound { .. })));
    }

    #[tokio::test]
    async fn test_index_digest_matches_served_chart() {
        let registry = MockRegistry::new();
        // team-a/demo is listed first but has no tags yet
        registry.add_repository("team-a/demo");
        registry.push_chart("team-b/demo", "1.0.0", &chart("demo", "1.0.0"), b"B-archive");
        let catalog = Catalog::new(Arc::new(registry.clone()));
        catalog.index().await.unwrap();

        registry.push_chart("team-a/demo", "1.0.0", &chart("demo", "1.0.0"), b"A-archive");
        let index = catalog.index().await.unwrap();

        let entry = index.get_version("demo", "1.0.0").unwrap();
        let served = catalog.chart_bytes("demo-1.0.0.tgz").await.unwrap();
        assert_eq!(served, b"B-archive");
        assert_eq!(format!("sha256:{}", entry.digest), compute_digest(&served));
        assert_eq!(index.get("demo").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_scans() {
        let (_, catalog) = demo_catalog();

        let (a, b) = tokio::join!(catalog.scan(), catalog.scan());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(catalog.stats(), CacheStats { records: 2, paths: 2 });
    }

    #[tokio::test]
    async fn test_scan_failure_keeps_cache() {
        let (registry, catalog) = demo_catalog();
        catalog.scan().await.unwrap();

        registry.fail_catalog(MockFailure::Server);
        assert!(catalog.index().await.is_err());
        assert!(catalog.chart_bytes("demo-1.1.0.tgz").await.is_ok());
    }
}
