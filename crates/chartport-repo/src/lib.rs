//! Chartport Chart Catalog
//!
//! This crate turns an OCI registry into a Helm chart repository:
//!
//! - **Registry scanning**: Walks every repository and tag, keeps Helm chart artifacts
//! - **Catalog cache**: Decoded chart metadata and chart path lookups, shared across scans
//! - **Index generation**: Helm-compatible `index.yaml`
//! - **Chart downloads**: Streams the chart archive layer straight from the registry
//!
//! ## Key Features
//!
//! - **Scheme detection**: Probes http then https when the registry URL has no scheme
//! - **Credential forwarding**: Basic auth from a dockerconfigjson secret, bearer token exchange
//! - **Partial access**: Repositories the credentials cannot read are skipped, not fatal
//! - **Integrity**: Chart config blobs are checked against their sha256 digest
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartport_repo::{Catalog, RegistryOptions, ScanPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = RegistryOptions::new("localhost:5000");
//! let catalog = Catalog::connect(options, ScanPolicy::default()).await?;
//!
//! // Scan the registry and render the index
//! let index = catalog.index().await?;
//! println!("{}", index.to_yaml()?);
//!
//! // Download a chart archive
//! let archive = catalog.chart_bytes("nginx-15.0.0.tgz").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod config;
pub mod credentials;
pub mod chart;
pub mod registry;
pub mod oci;
pub mod mock;
pub mod cache;
pub mod index;
pub mod connector;
pub mod scanner;
pub mod resolver;
pub mod catalog;

// Re-exports for convenience
pub use error::{RepoError, Result};
pub use config::{RegistryOptions, ScanPolicy, Scheme};
pub use credentials::{Credentials, DockerConfig, load_docker_config, DEFAULT_SECRET_PATH};
pub use chart::{ArtifactRef, BlobLocation, ChartRecord, LogicalPath, Maintainer};
pub use registry::{ArtifactManifest, BlobStream, LayerDescriptor, RegistryClient};
pub use oci::HttpRegistry;
pub use mock::{MockFailure, MockRegistry};
pub use cache::{CacheStats, CatalogCache};
pub use index::{ChartVersion, RepositoryIndex, build_index};
pub use connector::{Connection, connect, fill_credentials};
pub use scanner::CatalogScanner;
pub use resolver::BlobResolver;
pub use catalog::Catalog;
