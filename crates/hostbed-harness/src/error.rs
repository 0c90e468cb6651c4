//! Harness error types.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Harness Errors
// =============================================================================

/// Errors raised by the simulation harness itself.
///
/// Handler failures never show up here; they become responses, `false` from
/// [`emit`](crate::TestContext::emit) or entries in the log.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A test context is already live on this thread.
    #[error("a test context is already active on this thread")]
    ContextExists,

    /// No test context is live on this thread.
    #[error("no active test context; call Harness::begin first")]
    NoActiveTest,

    /// The test passed but logged errors it did not allow.
    #[error(
        "test '{title}' logged errors; wrap the code that is expected to log errors in allow_error_logs"
    )]
    PolicyViolation { title: String },

    /// Request URIs are relative to the service root.
    #[error("request uri must not start with '/': {0}")]
    InvalidUri(String),

    /// The request URI does not form a valid URL.
    #[error("invalid request uri {uri}: {source}")]
    Url {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// A request or event payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// A handler answered with a body that is not JSON.
    #[error("response body is not JSON: {body}")]
    ResponseBody {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// A bearer token could not be created.
    #[error("failed to create bearer token: {0:#}")]
    Bearer(anyhow::Error),

    /// The environment file could not be read.
    #[error("failed to read environment file {path}: {source}")]
    Env {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors that can occur while loading [`HarnessConfig`](crate::HarnessConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The merged sources could not be extracted.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
