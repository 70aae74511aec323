//! Registry catalog scanner
//!
//! Walks every repository and tag of the registry, keeps the artifacts that are
//! Helm charts and decodes their metadata. Results come back in scan order:
//! repository listing order, then tag listing order.
//!
//! Per-unit failure handling:
//! - repository listing fails: the scan fails
//! - tag listing denied or repository unknown: the repository is skipped
//! - manifest fetch denied: the remaining tags of the repository are skipped
//! - any other manifest failure: the tag is skipped (or the scan fails under
//!   [`ScanPolicy::strict_manifest_errors`])
//! - config download, digest or decode failure: the scan fails

use crate::cache::CatalogCache;
use crate::chart::{ArtifactRef, BlobLocation, ChartRecord};
use crate::config::ScanPolicy;
use crate::error::{RepoError, Result};
use crate::registry::{ArtifactManifest, RegistryClient, verify_digest};

/// What to do with the rest of a repository after looking at one tag
enum TagOutcome {
    Chart(ChartRecord),
    Skip,
    StopRepository,
}

/// Scans a registry into chart records, memoizing through a [`CatalogCache`]
pub struct CatalogScanner<'a> {
    registry: &'a dyn RegistryClient,
    cache: &'a CatalogCache,
    policy: ScanPolicy,
}

impl<'a> CatalogScanner<'a> {
    pub fn new(registry: &'a dyn RegistryClient, cache: &'a CatalogCache) -> Self {
        Self {
            registry,
            cache,
            policy: ScanPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scan every repository and return the chart records found
    pub async fn scan_all(&self) -> Result<Vec<ChartRecord>> {
        let repositories = self.registry.list_repositories().await?;
        tracing::debug!(count = repositories.len(), "Listed registry repositories");

        let mut records = Vec::new();
        for repository in &repositories {
            self.scan_repository(repository, &mut records).await?;
        }

        tracing::info!(
            repositories = repositories.len(),
            charts = records.len(),
            "Registry scan complete"
        );
        Ok(records)
    }

    async fn scan_repository(&self, repository: &str, records: &mut Vec<ChartRecord>) -> Result<()> {
        let tags = match self.registry.list_tags(repository).await {
            Ok(tags) => tags,
            Err(e) if e.is_access_denied() || matches!(e, RepoError::RepositoryUnknown { .. }) => {
                tracing::warn!(repository, error = %e, "Skipping repository, cannot list tags");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for tag in &tags {
            match self.scan_tag(repository, tag).await? {
                TagOutcome::Chart(record) => records.push(record),
                TagOutcome::Skip => {}
                TagOutcome::StopRepository => break,
            }
        }
        Ok(())
    }

    async fn scan_tag(&self, repository: &str, tag: &str) -> Result<TagOutcome> {
        let manifest = match self.registry.get_manifest(repository, tag).await {
            Ok(manifest) => manifest,
            Err(e) if e.is_access_denied() => {
                tracing::warn!(repository, tag, error = %e, "Access denied to manifest, skipping repository");
                return Ok(TagOutcome::StopRepository);
            }
            Err(e) if self.policy.strict_manifest_errors => return Err(e),
            Err(e) => {
                tracing::warn!(repository, tag, error = %e, "Failed to fetch manifest, skipping tag");
                return Ok(TagOutcome::Skip);
            }
        };

        if !manifest.is_chart() {
            tracing::debug!(
                repository,
                tag,
                config_media_type = %manifest.config_media_type,
                layers = manifest.layers.len(),
                "Not a chart"
            );
            return Ok(if self.policy.assume_homogeneous {
                TagOutcome::StopRepository
            } else {
                TagOutcome::Skip
            });
        }

        let artifact = ArtifactRef::new(repository, tag);
        if let Some(record) = self.cache.record(&artifact) {
            return Ok(TagOutcome::Chart(record));
        }

        let record = self.fetch_record(&artifact, &manifest).await?;
        Ok(TagOutcome::Chart(record))
    }

    /// Download and decode the config blob, then cache the record
    async fn fetch_record(
        &self,
        artifact: &ArtifactRef,
        manifest: &ArtifactManifest,
    ) -> Result<ChartRecord> {
        let layer = manifest
            .content_layer()
            .ok_or_else(|| RepoError::InvalidManifest {
                reference: artifact.to_string(),
                message: "expected exactly one content layer".to_string(),
            })?;

        let config = self
            .registry
            .fetch_blob(&artifact.repository, &manifest.config_digest)
            .await?;
        verify_digest(&manifest.config_digest, &config)?;

        let mut record =
            ChartRecord::from_config(&config).map_err(|e| RepoError::InvalidChartConfig {
                reference: artifact.to_string(),
                message: e.to_string(),
            })?;
        record.content_digest = layer.digest.clone();

        let location = BlobLocation::new(&artifact.repository, &layer.digest);
        if !self
            .cache
            .insert(artifact.clone(), record.clone(), location)
        {
            tracing::warn!(
                artifact = %artifact,
                path = %record.logical_path(),
                "Chart path already served from another artifact"
            );
        }

        tracing::debug!(
            artifact = %artifact,
            chart = %record.name,
            version = %record.version,
            "Cached chart record"
        );
        Ok(record)
    }
}
