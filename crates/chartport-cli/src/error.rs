//! CLI error types with exit code handling
//!
//! Startup failures become a [`CliError`] with an exit code. Request failures
//! inside the server become an [`ApiError`] with an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chartport_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid configuration (secret file, flags)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(chartport::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// No transport reached the registry
    #[error("{message}")]
    #[diagnostic(
        code(chartport::cli::unreachable),
        help("check --storage-registry-repo and --storage-registry-scheme")
    )]
    Unreachable { message: String },

    /// The initial scan failed
    #[error("Registry scan failed: {message}")]
    #[diagnostic(code(chartport::cli::scan))]
    Scan { message: String },

    /// IO error (bind failure, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartport::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(chartport::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Unreachable { .. } => exit_codes::REGISTRY_UNREACHABLE,
            CliError::Scan { .. } => exit_codes::SCAN_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a scan error
    pub fn scan(err: RepoError) -> Self {
        Self::Scan {
            message: err.to_string(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::RegistryUnreachable { .. } => CliError::Unreachable {
                message: err.to_string(),
            },
            RepoError::InvalidSecretFile { .. } => CliError::Config {
                message: err.to_string(),
                help: Some("the secret must be a dockerconfigjson document".to_string()),
            },
            RepoError::InvalidRegistryUrl { .. } => CliError::Config {
                message: err.to_string(),
                help: None,
            },
            RepoError::Io(e) => CliError::from(e),
            other => CliError::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Request failure mapped to an HTTP status
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else {
            tracing::error!(error = %err, "Request failed");
            ApiError::Internal(err.to_string())
        }
    }
}
