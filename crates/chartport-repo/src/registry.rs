//! Registry capability trait
//!
//! The catalog only needs four operations from a registry. [`HttpRegistry`]
//! implements them over the distribution API; [`MockRegistry`] keeps them in
//! memory for tests.
//!
//! [`HttpRegistry`]: crate::oci::HttpRegistry
//! [`MockRegistry`]: crate::mock::MockRegistry

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;

use crate::error::{RepoError, Result};

/// Media types for Helm charts in OCI
pub mod media_types {
    /// Helm chart config
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

/// Streaming body of a blob download
pub type BlobStream = BoxStream<'static, Result<Bytes>>;

/// A layer referenced by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub digest: String,
    pub media_type: String,
    pub size: i64,
}

impl LayerDescriptor {
    pub fn new(digest: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            media_type: media_type.into(),
            size: 0,
        }
    }
}

/// The parts of an image manifest the catalog looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactManifest {
    pub config_media_type: String,
    pub config_digest: String,
    pub layers: Vec<LayerDescriptor>,
}

impl ArtifactManifest {
    /// A chart has the Helm config media type and exactly one content layer
    pub fn is_chart(&self) -> bool {
        self.config_media_type == media_types::HELM_CONFIG && self.layers.len() == 1
    }

    /// The single content layer of a chart artifact
    pub fn content_layer(&self) -> Option<&LayerDescriptor> {
        match self.layers.as_slice() {
            [layer] => Some(layer),
            _ => None,
        }
    }
}

/// Operations the catalog needs from a registry connection
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List every repository in the registry
    async fn list_repositories(&self) -> Result<Vec<String>>;

    /// List the tags of a repository
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Fetch the manifest of `repository:tag`
    async fn get_manifest(&self, repository: &str, tag: &str) -> Result<ArtifactManifest>;

    /// Open a streaming download of a blob
    async fn download_blob(&self, repository: &str, digest: &str) -> Result<BlobStream>;

    /// Download a whole blob into memory
    async fn fetch_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>> {
        let mut stream = self.download_blob(repository, digest).await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

/// Compute the `sha256:` digest of data
pub fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Check data against a digest. Only `sha256` digests are verified.
pub fn verify_digest(expected: &str, data: &[u8]) -> Result<()> {
    let Some(encoded) = expected.strip_prefix("sha256:") else {
        return Ok(());
    };

    let actual = compute_digest(data);
    if actual[7..].eq_ignore_ascii_case(encoded) {
        Ok(())
    } else {
        Err(RepoError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
