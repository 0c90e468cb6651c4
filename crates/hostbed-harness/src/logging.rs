//! Diagnostic output of the harness.
//!
//! Handler logs live in the [`LogSink`](crate::LogSink); this module only sets
//! up `tracing-subscriber` so the harness' own diagnostics and failure dumps
//! reach the test output.
//!
//! ```rust,ignore
//! use hostbed_harness::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("hostbed_core=trace")
//!     .span_events(SpanEvents::Lifecycle)
//!     .init();
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

/// Which span events of the dispatch spans are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanEvents {
    #[default]
    Off,
    /// Creation and close of every dispatch span.
    Lifecycle,
}

impl SpanEvents {
    fn fmt_span(self) -> FmtSpan {
        match self {
            Self::Off => FmtSpan::NONE,
            Self::Lifecycle => FmtSpan::NEW | FmtSpan::CLOSE,
        }
    }
}

/// Installs the global `tracing` subscriber once per process.
///
/// Output goes through the libtest capture, so it only shows for failing
/// tests unless `--nocapture` is passed.
pub fn init_test_logging() {
    LoggingBuilder::new().init();
}

/// Builds the harness' `tracing` subscriber.
///
/// `RUST_LOG` wins over the `info` default; extra directives are added on
/// top of either.
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    span_events: SpanEvents,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter directive such as `hostbed_harness=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    fn filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Installs the subscriber unless one is already set.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Fails if a global subscriber is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let layer = fmt::layer()
            .compact()
            .with_test_writer()
            .with_span_events(self.span_events.fmt_span());
        tracing_subscriber::registry()
            .with(layer)
            .with(self.filter())
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init_test_logging();
        init_test_logging();
        assert!(LoggingBuilder::new().try_init().is_err());
    }

    #[test]
    fn span_events_map_to_fmt_spans() {
        assert_eq!(SpanEvents::default().fmt_span(), FmtSpan::NONE);
        assert_eq!(SpanEvents::Lifecycle.fmt_span(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn directives_extend_the_filter() {
        let filter = LoggingBuilder::new()
            .directive("hostbed_core=trace")
            .directive("not a directive ===")
            .filter();
        assert!(filter.to_string().contains("hostbed_core=trace"));
    }
}
