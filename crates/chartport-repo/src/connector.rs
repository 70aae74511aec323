//! Registry connection setup
//!
//! Settles the transport scheme and credentials before any registry call is
//! made. The scheme comes from the explicit option, then from the URL prefix;
//! when neither is given, plain http is probed first and https second. The
//! winning prefix is written back into the options.

use async_trait::async_trait;
use std::path::Path;

use crate::config::{RegistryOptions, Scheme};
use crate::credentials::{Credentials, load_docker_config};
use crate::error::{RepoError, Result};
use crate::oci::HttpRegistry;

/// A registry endpoint whose scheme has been settled
pub struct Connection {
    pub scheme: Scheme,
    /// Options with `scheme` set and `url` carrying the matching prefix
    pub options: RegistryOptions,
    pub registry: HttpRegistry,
}

/// Reachability check run against each candidate endpoint
#[async_trait]
trait EndpointProbe: Send + Sync {
    async fn probe(&self, registry: &HttpRegistry) -> Result<()>;
}

/// Probe with `GET /v2/`
struct PingProbe;

#[async_trait]
impl EndpointProbe for PingProbe {
    async fn probe(&self, registry: &HttpRegistry) -> Result<()> {
        registry.ping().await
    }
}

/// Fill missing credentials from the dockerconfigjson secret at `secret_file`.
///
/// Credentials already present on `options` take precedence over the file.
pub fn fill_credentials(options: &mut RegistryOptions, secret_file: &Path) -> Result<()> {
    if options.has_credentials() {
        return Ok(());
    }

    let config = load_docker_config(secret_file)?;
    if config.apply_to(options) {
        tracing::info!(
            registry = %options.host(),
            username = %options.username,
            "Using registry credentials from secret"
        );
    } else {
        tracing::debug!(registry = %options.host(), "No registry credentials found in secret");
    }
    Ok(())
}

/// Connect to the registry described by `options`
pub async fn connect(options: RegistryOptions) -> Result<Connection> {
    connect_with(options, &PingProbe).await
}

async fn connect_with(
    mut options: RegistryOptions,
    prober: &dyn EndpointProbe,
) -> Result<Connection> {
    let credentials = Credentials::from_options(&options);

    if let Some(scheme) = options.resolve_scheme() {
        let url = options.url_for(scheme);
        let registry = HttpRegistry::new(&url, credentials, options.insecure_skip_tls)?;
        prober
            .probe(&registry)
            .await
            .map_err(|e| RepoError::RegistryUnreachable {
                url: url.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(registry = %url, %scheme, "Connected to registry");
        options.url = url;
        return Ok(Connection {
            scheme,
            options,
            registry,
        });
    }

    let mut failures = Vec::new();
    for scheme in [Scheme::Http, Scheme::Https] {
        let url = options.url_for(scheme);
        let registry = HttpRegistry::new(&url, credentials.clone(), options.insecure_skip_tls)?;
        match prober.probe(&registry).await {
            Ok(()) => {
                tracing::info!(registry = %url, %scheme, "Detected registry scheme");
                options.scheme = Some(scheme);
                options.url = url;
                return Ok(Connection {
                    scheme,
                    options,
                    registry,
                });
            }
            Err(e) => {
                tracing::debug!(registry = %url, error = %e, "Registry probe failed");
                failures.push(format!("{}: {}", scheme, e));
            }
        }
    }

    Err(RepoError::RegistryUnreachable {
        url: options.host().to_string(),
        message: failures.join("; "),
    })
}
