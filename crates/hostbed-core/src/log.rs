//! Structured logging for hosted handlers.
//!
//! Every invocation gets its own [`Logger`]. Entries are buffered in memory and
//! handed to the configured [`LogTransport`]s as one batch when the invocation
//! is flushed, so a transport never observes half of an invocation's log.
//!
//! ```rust,ignore
//! async fn greet(ctx: Arc<Context>, _req: Request) -> anyhow::Result<Response> {
//!     ctx.log().info("here");
//!     ctx.log().log(LogLevel::Debug, "details", None, Some(json!({ "step": 1 })));
//!     Ok(Response::ok())
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::NowFn;

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Returns the level name as used in the structured JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// `true` for `error` and `fatal`.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log record.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Wall time as observed by the handler (virtual in tests).
    pub timestamp: DateTime<Utc>,
    /// Monotonic instant the entry was written.
    pub at: Instant,
    /// Rendered error chain, if an error was attached.
    pub error: Option<String>,
    /// The entry serialized as a JSON object.
    pub json: String,
    pub data: Option<Value>,
}

impl LogEntry {
    /// Builds an entry and its JSON rendering.
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        error: Option<&anyhow::Error>,
        data: Option<Value>,
    ) -> Self {
        let message = message.into();

        let mut record = Map::new();
        record.insert("level".into(), json!(level));
        record.insert("message".into(), json!(message));
        record.insert(
            "timestamp".into(),
            json!(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if let Some(err) = error {
            let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
            record.insert(
                "error".into(),
                json!({ "message": err.to_string(), "chain": chain }),
            );
        }
        if let Some(data) = &data {
            record.insert("data".into(), data.clone());
        }

        Self {
            level,
            message,
            timestamp,
            at: Instant::now(),
            error: error.map(|e| format!("{e:#}")),
            json: Value::Object(record).to_string(),
            data,
        }
    }
}

/// Receives flushed batches of log entries.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Accepts one batch. The batch belongs to a single flush of a single
    /// invocation.
    async fn send_entries(&self, entries: Vec<LogEntry>);
}

/// Buffering logger handed to a handler through its [`Context`](crate::Context).
pub struct Logger {
    buffer: Mutex<Vec<LogEntry>>,
    transports: Vec<Arc<dyn LogTransport>>,
    now: NowFn,
}

impl Logger {
    /// Creates a logger writing to `transports`, stamping entries with `now`.
    pub fn new(transports: Vec<Arc<dyn LogTransport>>, now: NowFn) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            transports,
            now,
        }
    }

    /// Appends an entry with an optional error and structured data.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<&anyhow::Error>,
        data: Option<Value>,
    ) {
        let entry = LogEntry::new(level, message, (self.now)(), error, data);
        self.buffer.lock().push(entry);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message, None, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message, None, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None, None);
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message, None, None);
    }

    /// Number of entries waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Hands all buffered entries to every transport.
    pub async fn flush(&self) {
        let entries = std::mem::take(&mut *self.buffer.lock());
        if entries.is_empty() {
            return;
        }
        for transport in &self.transports {
            transport.send_entries(entries.clone()).await;
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("pending", &self.pending())
            .field("transports", &self.transports.len())
            .finish()
    }
}
