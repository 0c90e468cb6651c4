//! Log sink collecting every entry written during a test.
//!
//! The sink enforces the error-log policy: an `error` or `fatal` entry
//! arriving while the policy is enabled marks the test as failed, and the mark
//! stays until [`LogSink::clear`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use hostbed_core::{LogEntry, LogLevel, LogTransport};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{error, info};

struct SinkState {
    entries: Vec<LogEntry>,
    fail_on_error_logs: bool,
    failed: bool,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            fail_on_error_logs: true,
            failed: false,
        }
    }
}

/// Collects the log entries of one test.
pub struct LogSink {
    state: Mutex<SinkState>,
    started: Instant,
    results_dir: PathBuf,
}

impl LogSink {
    /// Creates an empty sink whose artifacts go to `results_dir`.
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(SinkState::default()),
            started: Instant::now(),
            results_dir: results_dir.into(),
        }
    }

    /// A copy of all entries in arrival order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.clone()
    }

    /// Drops all entries and restores the default policy.
    pub fn clear(&self) {
        *self.state.lock() = SinkState::default();
    }

    pub fn fail_on_error_logs(&self) -> bool {
        self.state.lock().fail_on_error_logs
    }

    pub fn set_fail_on_error_logs(&self, enabled: bool) {
        self.state.lock().fail_on_error_logs = enabled;
    }

    /// Whether a disallowed error entry has arrived.
    pub fn failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Seconds between sink creation and `entry`, rounded to 4 decimals.
    pub fn time_offset(&self, entry: &LogEntry) -> f64 {
        let secs = entry.at.saturating_duration_since(self.started).as_secs_f64();
        (secs * 10_000.0).round() / 10_000.0
    }

    fn describe(&self, entry: &LogEntry) -> String {
        format!(
            "@{:.4}s {} {}",
            self.time_offset(entry),
            level_string(entry.level),
            entry.message
        )
    }

    /// Prints every entry and persists them as an artifact.
    ///
    /// Returns the artifact path, or `None` when there was nothing to dump or
    /// the artifact could not be written.
    pub fn dump_log(&self, title: &str) -> Option<PathBuf> {
        let entries = self.entries();
        if entries.is_empty() {
            return None;
        }

        error!("{title} log:");
        for entry in &entries {
            let line = self.describe(entry);
            match &entry.error {
                Some(err) => error!("{line}\n{err}"),
                None if entry.level.is_error() => error!("{line}"),
                None => info!("{line}"),
            }
        }

        let written = self.write_log(&entries);
        if let Some(path) = &written {
            info!("Full log of \"{title}\" saved to {}", path.display());
        }
        written
    }

    /// Writes `entries` as a JSON array to a timestamped file.
    ///
    /// On failure the whole log goes to the tracing output instead.
    pub fn write_log(&self, entries: &[LogEntry]) -> Option<PathBuf> {
        match self.try_write_log(entries) {
            Ok(path) => Some(path),
            Err(err) => {
                error!(error = %err, "Error saving log");
                info!("Full log:");
                for entry in entries {
                    match &entry.error {
                        Some(e) => info!("{}\n{e}", self.describe(entry)),
                        None => info!("{}", self.describe(entry)),
                    }
                }
                None
            }
        }
    }

    fn try_write_log(&self, entries: &[LogEntry]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.results_dir)?;
        let path = artifact_path(&self.results_dir);

        let records: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let mut record = Map::new();
                record.insert("timeOffset".into(), Value::from(self.time_offset(entry)));
                if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&entry.json) {
                    record.extend(fields);
                }
                Value::Object(record)
            })
            .collect();

        let text = serde_json::to_string_pretty(&records).map_err(io::Error::other)?;
        fs::write(&path, text)?;
        Ok(path)
    }
}

#[async_trait]
impl LogTransport for LogSink {
    async fn send_entries(&self, entries: Vec<LogEntry>) {
        let mut state = self.state.lock();
        if state.fail_on_error_logs && entries.iter().any(|e| e.level.is_error()) {
            state.failed = true;
        }
        state.entries.extend(entries);
    }
}

fn artifact_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y-%m-%dT%H%M%S%.3fZ");
    dir.join(format!("log-{stamp}.json"))
}

/// Fixed-width label of a level, as used in dumps.
pub fn level_string(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "[TRACE]  ",
        LogLevel::Debug => "[DEBUG]  ",
        LogLevel::Info => "[INFO]   ",
        LogLevel::Warning => "[WARNING]",
        LogLevel::Error => "[ERROR]  ",
        LogLevel::Fatal => "[FATAL]  ",
    }
}
