//! Error types shared by hosted handlers and the dispatch entry points.
//!
//! Handlers return `anyhow::Result`; the entry points downcast the error to
//! decide how it surfaces. An [`HttpError`] carries its own status and public
//! body, a [`HostError`] describes failures the host itself detected, and any
//! other error is an internal server error.

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// HTTP Errors
// =============================================================================

/// An error that knows which HTTP status it should be answered with.
///
/// `message` is the internal description that ends up in the log. Only `body`
/// is sent back to the caller.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    /// Status code of the response.
    pub status: u16,
    /// Internal message, logged but never returned.
    pub message: String,
    /// JSON body returned to the caller, if any.
    pub body: Option<Value>,
}

impl HttpError {
    /// Creates an error with the given status and internal message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Replaces the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Adds a `message` field to the public body.
    ///
    /// An existing object body keeps its other fields. `None` leaves the error
    /// untouched.
    pub fn with_public_message(mut self, message: Option<impl Into<String>>) -> Self {
        let Some(message) = message else {
            return self;
        };
        match &mut self.body {
            Some(Value::Object(body)) => {
                body.insert("message".into(), Value::String(message.into()));
            }
            _ => {
                let mut body = Map::new();
                body.insert("message".into(), Value::String(message.into()));
                self.body = Some(Value::Object(body));
            }
        }
        self
    }

    /// 400, optionally explaining to the caller what was wrong.
    pub fn bad_request(public_message: Option<&str>) -> Self {
        Self::new(400, "Bad request").with_public_message(public_message)
    }

    /// 401: the caller should authenticate, e.g. log in or refresh its tokens.
    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
    }

    /// 403: the caller is known and will never get in.
    pub fn forbidden() -> Self {
        Self::new(403, "Forbidden")
    }

    /// 404.
    pub fn not_found() -> Self {
        Self::new(404, "Not found")
    }

    /// 501.
    pub fn not_implemented() -> Self {
        Self::new(501, "Not implemented")
    }
}

// =============================================================================
// Host Errors
// =============================================================================

/// Failures detected by the host while running a handler.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// The handler did not finish within its configured timeout.
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// A required value was absent.
    #[error("{0}")]
    Missing(String),

    /// A required environment variable is not set.
    #[error("please set the {0} environment variable")]
    MissingEnvironment(&'static str),
}

impl HostError {
    /// Status code used when this error ends an HTTP request.
    pub fn status(&self) -> u16 {
        match self {
            Self::TimedOut(_) => 504,
            _ => 500,
        }
    }
}

// =============================================================================
// Emit Errors
// =============================================================================

/// Errors returned when a handler emits an event.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The invocation was cancelled before the event was handed over.
    #[error("event emission cancelled")]
    Cancelled,

    /// The payload could not be encoded as JSON.
    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The sender refused the event.
    #[error("event rejected: {0}")]
    Rejected(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for event emission.
pub type EmitResult<T> = Result<T, EmitError>;

/// Returns the error used when a required value is absent.
///
/// ```rust,ignore
/// let name = body.get("name").ok_or_else(|| missing(Some("name")))?;
/// ```
pub fn missing(what: Option<&str>) -> anyhow::Error {
    let message = match what {
        Some(what) => format!("Missing {what}."),
        None => "Missing.".to_string(),
    };
    HostError::Missing(message).into()
}
