//! In-memory registry for testing
//!
//! Holds repositories, manifests and blobs in memory and counts every call, so
//! tests can assert on cache behaviour without a running registry.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chart::ChartRecord;
use crate::error::{RepoError, Result};
use crate::registry::{
    ArtifactManifest, BlobStream, LayerDescriptor, RegistryClient, compute_digest, media_types,
};

/// Config media type of a plain container image
pub const IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// Blobs are streamed in chunks of this size
const CHUNK_SIZE: usize = 4;

/// Failure a mock call can be told to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unauthorized,
    PolicyViolation,
    UnknownRepository,
    Server,
}

impl MockFailure {
    fn to_error(self, subject: &str) -> RepoError {
        match self {
            MockFailure::Unauthorized => RepoError::Unauthorized {
                url: subject.to_string(),
            },
            MockFailure::PolicyViolation => RepoError::PolicyViolation {
                message: subject.to_string(),
            },
            MockFailure::UnknownRepository => RepoError::RepositoryUnknown {
                name: subject.to_string(),
            },
            MockFailure::Server => RepoError::HttpError {
                status: 500,
                message: format!("internal error for {}", subject),
            },
        }
    }
}

/// Counts of registry calls for test assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub repository_lists: usize,
    pub tag_lists: usize,
    pub manifest_fetches: usize,
    pub blob_downloads: usize,
}

#[derive(Default)]
struct MockRepository {
    tags: IndexMap<String, ArtifactManifest>,
    tags_failure: Option<MockFailure>,
    manifest_failures: HashMap<String, MockFailure>,
}

#[derive(Default)]
struct MockState {
    repositories: IndexMap<String, MockRepository>,
    blobs: HashMap<String, Vec<u8>>,
    catalog_failure: Option<MockFailure>,
}

/// In-memory registry
#[derive(Clone, Default)]
pub struct MockRegistry {
    state: Arc<RwLock<MockState>>,
    operations: Arc<RwLock<OperationCounts>>,
}

impl MockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap_or_else(PoisonError::into_inner) =
            OperationCounts::default();
    }

    /// Store a blob and return its digest
    pub fn push_blob(&self, data: &[u8]) -> String {
        let digest = compute_digest(data);
        self.write().blobs.insert(digest.clone(), data.to_vec());
        digest
    }

    /// Store a blob under a digest it may not hash to
    pub fn push_blob_as(&self, digest: &str, data: &[u8]) {
        self.write().blobs.insert(digest.to_string(), data.to_vec());
    }

    /// Declare an empty repository
    pub fn add_repository(&self, repository: &str) {
        self.write()
            .repositories
            .entry(repository.to_string())
            .or_default();
    }

    /// Tag a raw manifest
    pub fn push_manifest(&self, repository: &str, tag: &str, manifest: ArtifactManifest) {
        self.write()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .tags
            .insert(tag.to_string(), manifest);
    }

    /// Push a chart: config blob from `record`, one content layer from `content`.
    ///
    /// Returns the content layer digest.
    pub fn push_chart(
        &self,
        repository: &str,
        tag: &str,
        record: &ChartRecord,
        content: &[u8],
    ) -> String {
        let config = serde_json::to_vec(record).unwrap_or_default();
        let config_digest = self.push_blob(&config);
        let layer_digest = self.push_blob(content);

        self.push_manifest(
            repository,
            tag,
            ArtifactManifest {
                config_media_type: media_types::HELM_CONFIG.to_string(),
                config_digest,
                layers: vec![LayerDescriptor::new(&layer_digest, media_types::HELM_CONTENT)],
            },
        );
        layer_digest
    }

    /// Push a plain container image with a single layer
    pub fn push_image(&self, repository: &str, tag: &str) {
        let config_digest = self.push_blob(b"{}");
        let layer_digest = self.push_blob(format!("{}:{}", repository, tag).as_bytes());
        self.push_manifest(
            repository,
            tag,
            ArtifactManifest {
                config_media_type: IMAGE_CONFIG.to_string(),
                config_digest,
                layers: vec![LayerDescriptor::new(
                    layer_digest,
                    "application/vnd.oci.image.layer.v1.tar+gzip",
                )],
            },
        );
    }

    /// Make repository listing fail
    pub fn fail_catalog(&self, failure: MockFailure) {
        self.write().catalog_failure = Some(failure);
    }

    /// Make tag listing of `repository` fail
    pub fn fail_tags(&self, repository: &str, failure: MockFailure) {
        self.write()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .tags_failure = Some(failure);
    }

    /// Make the manifest fetch of `repository:tag` fail
    pub fn fail_manifest(&self, repository: &str, tag: &str, failure: MockFailure) {
        self.write()
            .repositories
            .entry(repository.to_string())
            .or_default()
            .manifest_failures
            .insert(tag.to_string(), failure);
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        self.count(|c| c.repository_lists += 1);
        let state = self.read();
        if let Some(failure) = state.catalog_failure {
            return Err(failure.to_error("catalog"));
        }
        Ok(state.repositories.keys().cloned().collect())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        self.count(|c| c.tag_lists += 1);
        let state = self.read();
        let repo = state
            .repositories
            .get(repository)
            .ok_or_else(|| MockFailure::UnknownRepository.to_error(repository))?;
        if let Some(failure) = repo.tags_failure {
            return Err(failure.to_error(repository));
        }
        Ok(repo.tags.keys().cloned().collect())
    }

    async fn get_manifest(&self, repository: &str, tag: &str) -> Result<ArtifactManifest> {
        self.count(|c| c.manifest_fetches += 1);
        let reference = format!("{}:{}", repository, tag);
        let state = self.read();
        let repo = state
            .repositories
            .get(repository)
            .ok_or_else(|| MockFailure::UnknownRepository.to_error(repository))?;
        if let Some(failure) = repo.manifest_failures.get(tag) {
            return Err(failure.to_error(&reference));
        }
        repo.tags
            .get(tag)
            .cloned()
            .ok_or(RepoError::ManifestNotFound { reference })
    }

    async fn download_blob(&self, repository: &str, digest: &str) -> Result<BlobStream> {
        self.count(|c| c.blob_downloads += 1);
        let data = self
            .read()
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| RepoError::HttpError {
                status: 404,
                message: format!("BLOB_UNKNOWN: {}@{}", repository, digest),
            })?;

        let chunks: Vec<Result<Bytes>> = data
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}
