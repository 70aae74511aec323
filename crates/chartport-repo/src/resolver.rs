//! Chart download resolution

use crate::cache::CatalogCache;
use crate::chart::LogicalPath;
use crate::error::{RepoError, Result};
use crate::registry::{BlobStream, RegistryClient};

/// Maps a logical chart path to its content blob and opens it
pub struct BlobResolver<'a> {
    registry: &'a dyn RegistryClient,
    cache: &'a CatalogCache,
}

impl<'a> BlobResolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient, cache: &'a CatalogCache) -> Self {
        Self { registry, cache }
    }

    /// Stream the content layer behind `path`.
    ///
    /// `path` may omit the `.tgz` suffix. Paths that no scan has bound yield
    /// [`RepoError::ChartNotFound`].
    pub async fn resolve_and_stream(&self, path: &str) -> Result<BlobStream> {
        let path = LogicalPath::from_request(path);
        let location = self
            .cache
            .locate(&path)
            .ok_or_else(|| RepoError::ChartNotFound {
                path: path.to_string(),
            })?;

        tracing::debug!(
            path = %path,
            repository = %location.repository,
            digest = %location.digest,
            "Streaming chart"
        );
        self.registry
            .download_blob(&location.repository, &location.digest)
            .await
    }
}
