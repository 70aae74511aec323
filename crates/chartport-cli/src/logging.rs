//! Tracing subscriber setup

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, prelude::*, registry};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `level`. Noisy transport crates are capped at `warn`.
pub fn init(level: &str, format: LogFormat) {
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let subscriber = registry().with(env_filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match format {
        LogFormat::Human => subscriber.with(fmt_layer).init(),
        LogFormat::Json => subscriber.with(fmt_layer.json()).init(),
    }
}
