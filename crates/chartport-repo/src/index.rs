//! Repository index types
//!
//! Helm-compatible `index.yaml` built from scanned chart records.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::chart::{ChartRecord, Maintainer};
use crate::error::{RepoError, Result};

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Charts by name, in the order they were first seen
    #[serde(default)]
    pub entries: IndexMap<String, Vec<ChartVersion>>,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            entries: IndexMap::new(),
            generated: Utc::now(),
        }
    }
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::Serialization(e.to_string()))
    }

    /// Render as `index.yaml`
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartVersion>> {
        self.entries.get(name)
    }

    /// Get a specific version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartVersion> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// List all chart names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Add an entry to the index
    pub fn add_entry(&mut self, entry: ChartVersion) {
        self.entries
            .entry(entry.name.clone())
            .or_default()
            .push(entry);
    }
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Chart type (application or library)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, String>,

    /// Download URLs, relative to the repository root
    #[serde(default)]
    pub urls: Vec<String>,

    /// Hex digest of the chart archive
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl From<&ChartRecord> for ChartVersion {
    fn from(record: &ChartRecord) -> Self {
        Self {
            name: record.name.clone(),
            version: record.version.clone(),
            api_version: record.api_version.clone(),
            app_version: record.app_version.clone(),
            description: record.description.clone(),
            r#type: record.r#type.clone(),
            home: record.home.clone(),
            icon: record.icon.clone(),
            sources: record.sources.clone(),
            keywords: record.keywords.clone(),
            maintainers: record.maintainers.clone(),
            kube_version: record.kube_version.clone(),
            deprecated: record.deprecated,
            annotations: record.annotations.clone(),
            urls: vec![record.logical_path().download_url()],
            digest: record.encoded_digest().to_string(),
        }
    }
}

/// Group scanned records into an index.
///
/// Charts and their versions keep scan order. A repeated (name, version) pair
/// keeps its first occurrence; callers holding a cache filter records with
/// [`CatalogCache::serves`] first so the kept entry is the one downloads return.
///
/// [`CatalogCache::serves`]: crate::cache::CatalogCache::serves
pub fn build_index(records: &[ChartRecord]) -> RepositoryIndex {
    let mut index = RepositoryIndex::default();
    let mut seen = HashSet::new();

    for record in records {
        if !seen.insert((record.name.as_str(), record.version.as_str())) {
            tracing::warn!(
                chart = %record.name,
                version = %record.version,
                digest = %record.content_digest,
                "Duplicate chart version in registry, keeping the first one"
            );
            continue;
        }
        index.add_entry(ChartVersion::from(record));
    }

    index
}
