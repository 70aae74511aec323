//! Error types for catalog and registry operations

use thiserror::Error;

/// Catalog and registry errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Connection Errors ============
    #[error("Registry unreachable at {url} over http and https: {message}")]
    RegistryUnreachable { url: String, message: String },

    #[error("Invalid registry URL: {url} - {reason}")]
    InvalidRegistryUrl { url: String, reason: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    // ============ Access Errors ============
    #[error("Unauthorized: {url}")]
    Unauthorized { url: String },

    #[error("Project policy violation: {message}")]
    PolicyViolation { message: String },

    #[error("Repository name not known to registry: {name}")]
    RepositoryUnknown { name: String },

    #[error("Token exchange failed: {message}")]
    TokenExchange { message: String },

    // ============ Artifact Errors ============
    #[error("Manifest not found: {reference}")]
    ManifestNotFound { reference: String },

    #[error("Invalid manifest for {reference}: {message}")]
    InvalidManifest { reference: String, message: String },

    #[error("Invalid chart config for {reference}: {message}")]
    InvalidChartConfig { reference: String, message: String },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    // ============ Catalog Errors ============
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    // ============ Secret Errors ============
    #[error("Invalid secret file {path}: {message}")]
    InvalidSecretFile { path: String, message: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    /// Authorization and policy failures; the scanner skips the affected unit
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            RepoError::Unauthorized { .. } | RepoError::PolicyViolation { .. }
        )
    }

    /// Whether this error means "no such chart" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::ChartNotFound { .. })
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}
