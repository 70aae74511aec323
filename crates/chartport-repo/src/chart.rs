//! Chart catalog data model
//!
//! A [`ChartRecord`] is decoded from the config blob of a chart artifact. It is
//! reachable through two keys: the [`ArtifactRef`] it was scanned from and the
//! [`LogicalPath`] under which it is downloaded.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// File extension of packaged charts
pub const CHART_EXTENSION: &str = ".tgz";

/// Chart metadata extracted from an artifact's config blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRecord {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub app_version: String,

    /// Chart type (application or library)
    #[serde(default)]
    pub r#type: String,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    #[serde(default)]
    pub kube_version: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub annotations: IndexMap<String, String>,

    /// Digest of the single content layer, e.g. `sha256:ab12...`
    #[serde(skip)]
    pub content_digest: String,
}

impl ChartRecord {
    /// Minimal record, mostly useful for tests and fixtures
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            api_version: String::new(),
            app_version: String::new(),
            r#type: String::new(),
            home: None,
            icon: None,
            sources: Vec::new(),
            keywords: Vec::new(),
            maintainers: Vec::new(),
            kube_version: None,
            deprecated: false,
            annotations: IndexMap::new(),
            content_digest: String::new(),
        }
    }

    /// Decode a chart config blob (Chart.yaml rendered as JSON)
    pub fn from_config(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Public path this chart is served under
    pub fn logical_path(&self) -> LogicalPath {
        LogicalPath::for_chart(&self.name, &self.version)
    }

    /// Content digest without its algorithm prefix, as Helm indexes expect
    pub fn encoded_digest(&self) -> &str {
        self.content_digest
            .split_once(':')
            .map(|(_, encoded)| encoded)
            .unwrap_or(&self.content_digest)
    }
}

/// Chart maintainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Identity of a scanned registry artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub repository: String,
    pub tag: String,
}

impl ArtifactRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Physical coordinates of a chart's content layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub repository: String,
    pub digest: String,
}

impl BlobLocation {
    pub fn new(repository: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            digest: digest.into(),
        }
    }
}

/// Public identity of a chart: `<name>-<version>.tgz`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath(String);

impl LogicalPath {
    pub fn for_chart(name: &str, version: &str) -> Self {
        Self(format!("{}-{}{}", name, version, CHART_EXTENSION))
    }

    /// Normalize a requested path; the `.tgz` suffix is optional
    pub fn from_request(path: &str) -> Self {
        let path = path.trim_start_matches('/');
        if path.ends_with(CHART_EXTENSION) {
            Self(path.to_string())
        } else {
            Self(format!("{}{}", path, CHART_EXTENSION))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Download URL relative to the repository root
    pub fn download_url(&self) -> String {
        format!("charts/{}", self.0)
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LogicalPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_config_blob() {
        let config = br#"{
            "name": "demo",
            "version": "1.0.0",
            "description": "A demo chart",
            "apiVersion": "v2",
            "appVersion": "2.3.4",
            "type": "application",
            "keywords": ["web"],
            "maintainers": [{"name": "ops", "email": "ops@example.com"}],
            "kubeVersion": ">=1.20.0"
        }"#;

        let record = ChartRecord::from_config(config).unwrap();
        assert_eq!(record.name, "demo");
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.api_version, "v2");
        assert_eq!(record.app_version, "2.3.4");
        assert_eq!(record.r#type, "application");
        assert_eq!(record.keywords, vec!["web".to_string()]);
        assert_eq!(record.maintainers[0].email.as_deref(), Some("ops@example.com"));
        assert_eq!(record.kube_version.as_deref(), Some(">=1.20.0"));
        assert!(record.content_digest.is_empty());
    }

    #[test]
    fn test_decode_requires_name_and_version() {
        assert!(ChartRecord::from_config(br#"{"version": "1.0.0"}"#).is_err());
        assert!(ChartRecord::from_config(br#"{"name": "demo"}"#).is_err());
        assert!(ChartRecord::from_config(b"not json").is_err());
    }

    #[test]
    fn test_logical_path() {
        let record = ChartRecord::new("demo", "1.1.0");
        assert_eq!(record.logical_path().as_str(), "demo-1.1.0.tgz");
        assert_eq!(record.logical_path().download_url(), "charts/demo-1.1.0.tgz");
    }

    #[test]
    fn test_logical_path_from_request() {
        let expected = LogicalPath::for_chart("demo", "1.0.0");
        assert_eq!(LogicalPath::from_request("demo-1.0.0"), expected);
        assert_eq!(LogicalPath::from_request("demo-1.0.0.tgz"), expected);
        assert_eq!(LogicalPath::from_request("/demo-1.0.0.tgz"), expected);
    }

    #[test]
    fn test_encoded_digest() {
        let mut record = ChartRecord::new("demo", "1.0.0");
        record.content_digest = "sha256:abc123".to_string();
        assert_eq!(record.encoded_digest(), "abc123");

        record.content_digest = "abc123".to_string();
        assert_eq!(record.encoded_digest(), "abc123");
    }

    #[test]
    fn test_artifact_ref_display() {
        let r = ArtifactRef::new("library/demo", "1.0.0");
        assert_eq!(r.to_string(), "library/demo:1.0.0");
    }
}
