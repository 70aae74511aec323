//! Chartport - serve the Helm charts of an OCI registry as a chart repository

use chartport_repo::{Catalog, DEFAULT_SECRET_PATH, RegistryOptions, ScanPolicy, fill_credentials};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod error;
mod exit_codes;
mod logging;
mod server;

use error::{CliError, Result};
use logging::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "chartport")]
#[command(version)]
#[command(about = "Serve the Helm charts stored in an OCI registry as a chart repository", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Registry address, with or without http:// or https://
    #[arg(long, env = "STORAGE_REGISTRY_REPO", default_value = "localhost:5000")]
    storage_registry_repo: String,

    /// Registry scheme (http or https); probed when unset
    #[arg(long, env = "STORAGE_REGISTRY_SCHEME", default_value = "")]
    storage_registry_scheme: String,

    /// Registry username
    #[arg(long, env = "REGISTRY_USERNAME", default_value = "")]
    registry_username: String,

    /// Registry password
    #[arg(long, env = "REGISTRY_PASSWORD", default_value = "", hide_env_values = true)]
    registry_password: String,

    /// dockerconfigjson secret to read registry credentials from
    #[arg(long, env = "SECRET_FILE", default_value = DEFAULT_SECRET_PATH)]
    secret_file: PathBuf,

    /// Rescan the registry in the background every N seconds
    #[arg(long, env = "REFRESH_INTERVAL")]
    refresh_interval: Option<u64>,

    /// Inspect every tag instead of stopping at the first non-chart tag of a repository
    #[arg(long, env = "PROBE_ALL_TAGS")]
    probe_all_tags: bool,

    /// Fail the scan on manifest errors instead of skipping the tag
    #[arg(long, env = "STRICT_MANIFEST_ERRORS")]
    strict_manifest_errors: bool,

    /// Accept invalid TLS certificates from the registry
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY")]
    insecure_skip_tls_verify: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,
}

impl Cli {
    fn registry_options(&self) -> RegistryOptions {
        let mut options = RegistryOptions::new(&self.storage_registry_repo)
            .with_scheme(&self.storage_registry_scheme)
            .with_credentials(&self.registry_username, &self.registry_password);
        options.insecure_skip_tls = self.insecure_skip_tls_verify;
        options
    }

    fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            assume_homogeneous: !self.probe_all_tags,
            strict_manifest_errors: self.strict_manifest_errors,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    if let Err(e) = run(cli).await {
        let code = e.exit_code();
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut options = cli.registry_options();
    if !cli.storage_registry_scheme.is_empty() && options.scheme.is_none() {
        tracing::warn!(
            scheme = %cli.storage_registry_scheme,
            "Ignoring unknown registry scheme, it will be detected"
        );
    }
    fill_credentials(&mut options, &cli.secret_file)?;

    let catalog = Catalog::connect(options, cli.scan_policy()).await?;
    let catalog = Arc::new(catalog);

    let records = catalog.scan().await.map_err(CliError::scan)?;
    tracing::info!(
        registry = catalog.registry_url().unwrap_or_default(),
        charts = records.len(),
        "Initial scan complete"
    );

    if let Some(seconds) = cli.refresh_interval.filter(|s| *s > 0) {
        tracing::info!(interval_secs = seconds, "Background refresh enabled");
        server::spawn_refresh(Arc::clone(&catalog), Duration::from_secs(seconds));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, server::router(catalog)).await?;
    Ok(())
}
