//! Registry connection options and scan policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport scheme used to reach the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// URL prefix for this scheme (`http://` or `https://`)
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Http => "http://",
            Scheme::Https => "https://",
        }
    }

    /// Parse a scheme name, case-insensitively. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    /// Scheme implied by a URL prefix
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with(Scheme::Https.prefix()) {
            Some(Scheme::Https)
        } else if url.starts_with(Scheme::Http.prefix()) {
            Some(Scheme::Http)
        } else {
            None
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Strip a leading `http://` or `https://` from a URL or host string
pub fn strip_scheme(url: &str) -> &str {
    url.strip_prefix(Scheme::Http.prefix())
        .or_else(|| url.strip_prefix(Scheme::Https.prefix()))
        .unwrap_or(url)
}

/// Options for connecting to an OCI registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Transport scheme; `None` until resolved
    pub scheme: Option<Scheme>,
    /// Registry address, with or without scheme prefix
    pub url: String,
    pub username: String,
    pub password: String,
    /// Accept invalid TLS certificates when using https
    pub insecure_skip_tls: bool,
}

impl RegistryOptions {
    /// Create options for a registry address
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set an explicit scheme from a user-supplied string.
    ///
    /// Invalid values leave the scheme unset so that it is inferred later.
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = Scheme::parse(scheme);
        self
    }

    /// Set basic credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Resolve the scheme from the explicit option first, then from the URL prefix.
    ///
    /// Returns `None` when the scheme has to be probed.
    pub fn resolve_scheme(&mut self) -> Option<Scheme> {
        if self.scheme.is_none() {
            self.scheme = Scheme::from_url(&self.url);
        }
        self.scheme
    }

    /// Registry address without any scheme prefix
    pub fn host(&self) -> &str {
        strip_scheme(&self.url).trim_end_matches('/')
    }

    /// URL for the given scheme, always carrying the matching prefix
    pub fn url_for(&self, scheme: Scheme) -> String {
        format!("{}{}", scheme.prefix(), self.host())
    }

    /// Whether the host matches a secret-file key, ignoring scheme prefixes
    pub fn matches_host(&self, candidate: &str) -> bool {
        self.host() == strip_scheme(candidate).trim_end_matches('/')
    }

    /// Whether any credentials are configured
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

/// Knobs controlling how a scan walks the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Stop probing a repository's tags once one tag proves not to be a chart
    pub assume_homogeneous: bool,
    /// Abort the scan on manifest errors that are not access errors
    pub strict_manifest_errors: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            assume_homogeneous: true,
            strict_manifest_errors: false,
        }
    }
}
