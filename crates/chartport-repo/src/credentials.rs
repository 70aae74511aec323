//! Registry credentials from a dockerconfigjson secret
//!
//! The secret is the `kubernetes.io/dockerconfigjson` payload mounted into the
//! pod: a JSON object whose `auths` field maps registry hosts to credentials.
//! Hosts are matched with `http://`/`https://` stripped from both sides.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::RegistryOptions;
use crate::error::{RepoError, Result};

/// Default location of the mounted secret
pub const DEFAULT_SECRET_PATH: &str = "/etc/secret/dockerconfigjson";

/// Basic credentials forwarded to the registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials carried by registry options, if any
    pub fn from_options(options: &RegistryOptions) -> Option<Self> {
        options
            .has_credentials()
            .then(|| Self::new(&options.username, &options.password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// dockerconfigjson format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Entries keep file order so that the first match wins
    #[serde(default)]
    pub auths: IndexMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub auth: String,
}

impl DockerAuth {
    /// Username/password, falling back to the base64 `auth` field
    pub fn credentials(&self) -> Option<Credentials> {
        if !self.username.is_empty() || !self.password.is_empty() {
            return Some(Credentials::new(&self.username, &self.password));
        }
        if self.auth.is_empty() {
            return None;
        }

        let decoded =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &self.auth).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, pass) = decoded.split_once(':')?;
        Some(Credentials::new(user, pass))
    }
}

impl DockerConfig {
    /// Parse a dockerconfigjson document
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// First entry whose host matches the registry, ignoring scheme prefixes
    pub fn credentials_for(&self, options: &RegistryOptions) -> Option<Credentials> {
        self.auths
            .iter()
            .find(|(host, _)| options.matches_host(host))
            .and_then(|(_, auth)| auth.credentials())
    }

    /// Fill `options` with matching credentials. Returns whether a match was found.
    pub fn apply_to(&self, options: &mut RegistryOptions) -> bool {
        match self.credentials_for(options) {
            Some(creds) => {
                options.username = creds.username;
                options.password = creds.password;
                true
            }
            None => false,
        }
    }
}

/// Load the secret file.
///
/// A missing or unreadable file is not an error: the registry is used
/// anonymously. A file that exists but is not valid JSON is an error.
pub fn load_docker_config(path: &Path) -> Result<DockerConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not read registry secret, continuing without credentials"
            );
            return Ok(DockerConfig::default());
        }
    };

    DockerConfig::from_json(&content).map_err(|e| RepoError::InvalidSecretFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SECRET: &str = r#"{
        "auths": {
            "https://harbor.example.com": {
                "username": "robot",
                "password": "s3cret",
                "email": "robot@example.com",
                "auth": "cm9ib3Q6czNjcmV0"
            },
            "harbor.example.com": {
                "username": "second",
                "password": "never-used"
            },
            "encoded.example.com": {
                "auth": "dXNlcjpwYXNz"
            }
        }
    }"#;

    #[test]
    fn test_match_strips_scheme_on_both_sides() {
        let config = DockerConfig::from_json(SECRET).unwrap();

        let opts = RegistryOptions::new("harbor.example.com");
        let creds = config.credentials_for(&opts).unwrap();
        assert_eq!(creds, Credentials::new("robot", "s3cret"));

        let opts = RegistryOptions::new("http://harbor.example.com");
        assert_eq!(config.credentials_for(&opts).unwrap().username, "robot");
    }

    #[test]
    fn test_first_match_wins() {
        let config = DockerConfig::from_json(SECRET).unwrap();
        let mut opts = RegistryOptions::new("https://harbor.example.com");
        assert!(config.apply_to(&mut opts));
        assert_eq!(opts.username, "robot");
        assert_eq!(opts.password, "s3cret");
    }

    #[test]
    fn test_no_match_leaves_options_empty() {
        let config = DockerConfig::from_json(SECRET).unwrap();
        let mut opts = RegistryOptions::new("localhost:5000");
        assert!(!config.apply_to(&mut opts));
        assert!(!opts.has_credentials());
    }

    #[test]
    fn test_auth_field_fallback() {
        let config = DockerConfig::from_json(SECRET).unwrap();
        let opts = RegistryOptions::new("https://encoded.example.com");
        assert_eq!(
            config.credentials_for(&opts),
            Some(Credentials::new("user", "pass"))
        );
    }

    #[test]
    fn test_missing_secret_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_docker_config(&dir.path().join("absent.json")).unwrap();
        assert!(config.auths.is_empty());
    }

    #[test]
    fn test_malformed_secret_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let result = load_docker_config(file.path());
        assert!(matches!(result, Err(RepoError::InvalidSecretFile { .. })));
    }

    #[test]
    fn test_load_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SECRET.as_bytes()).unwrap();

        let config = load_docker_config(file.path()).unwrap();
        assert_eq!(config.auths.len(), 3);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("robot", "s3cret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("robot"));
        assert!(!printed.contains("s3cret"));
    }
}
