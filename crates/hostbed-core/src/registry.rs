//! Registry of hosted handlers.
//!
//! Handlers are kept in registration order, one list per kind. Every record
//! gets a process-unique [`HandlerId`] that derived data (compiled path
//! patterns, parsed schedules) can be keyed by.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::dispatch::{EventEnvelope, TimerTrigger};
use crate::handler::{
    BoxFuture, BoxedEventHandler, BoxedHttpHandler, BoxedTimerHandler, EventHandlerFn,
    HttpHandlerFn, TimerHandlerFn,
};
use crate::http::{Method, Request, Response};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution settings declared by a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerConfig {
    /// How long an invocation may run; the host decides when unset.
    pub timeout: Option<Duration>,
}

impl HandlerConfig {
    /// Timeout used when neither handler nor host set one.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// The declared timeout, or [`DEFAULT_TIMEOUT`](Self::DEFAULT_TIMEOUT).
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT)
    }
}

/// Describes where a handler came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub package_name: String,
    pub file_name: String,
    pub revision: String,
    pub config: Value,
}

/// The three kinds of handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Http,
    Event,
    Timer,
}

/// The match key of a handler, as shown in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HandlerKey {
    Http {
        method: Method,
        #[serde(rename = "pathPattern")]
        path_pattern: String,
    },
    Event {
        topic: String,
        #[serde(rename = "type")]
        event_type: String,
    },
    Timer {
        schedule: String,
    },
}

// =============================================================================
// Handler records
// =============================================================================

/// A registered HTTP handler.
#[derive(Clone)]
pub struct HttpHandler {
    pub id: HandlerId,
    pub method: Method,
    /// Path pattern without leading slash; `*` stands for one segment.
    pub path_pattern: String,
    pub config: HandlerConfig,
    pub meta: Option<Metadata>,
    handler: BoxedHttpHandler,
}

impl HttpHandler {
    pub fn key(&self) -> HandlerKey {
        HandlerKey::Http {
            method: self.method,
            path_pattern: self.path_pattern.clone(),
        }
    }

    pub fn call(
        &self,
        ctx: Arc<Context>,
        request: Request,
    ) -> BoxFuture<'static, anyhow::Result<Response>> {
        self.handler.call(ctx, request)
    }
}

impl fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHandler")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path_pattern", &self.path_pattern)
            .finish_non_exhaustive()
    }
}

/// A registered event handler.
#[derive(Clone)]
pub struct EventHandler {
    pub id: HandlerId,
    pub topic: String,
    pub event_type: String,
    pub config: HandlerConfig,
    pub meta: Option<Metadata>,
    handler: BoxedEventHandler,
}

impl EventHandler {
    pub fn key(&self) -> HandlerKey {
        HandlerKey::Event {
            topic: self.topic.clone(),
            event_type: self.event_type.clone(),
        }
    }

    pub fn call(
        &self,
        ctx: Arc<Context>,
        event: EventEnvelope,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self.handler.call(ctx, event)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// A registered timer handler.
#[derive(Clone)]
pub struct TimerHandler {
    pub id: HandlerId,
    /// Cron expression.
    pub schedule: String,
    pub config: HandlerConfig,
    pub meta: Option<Metadata>,
    handler: BoxedTimerHandler,
}

impl TimerHandler {
    pub fn key(&self) -> HandlerKey {
        HandlerKey::Timer {
            schedule: self.schedule.clone(),
        }
    }

    pub fn call(
        &self,
        ctx: Arc<Context>,
        trigger: TimerTrigger,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self.handler.call(ctx, trigger)
    }
}

impl fmt::Debug for TimerHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandler")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// All handlers of a service.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new()
///     .with_meta(Some(meta))
///     .get("greeting/*", greet)
///     .post("echo/*", echo)
///     .on("stuff", "happened", on_stuff)
///     .set_interval("0 */1 * * *", tick);
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    http: Vec<HttpHandler>,
    event: Vec<EventHandler>,
    timer: Vec<TimerHandler>,
    meta: Option<Metadata>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata attached to handlers registered after this call.
    pub fn with_meta(mut self, meta: Option<Metadata>) -> Self {
        self.meta = meta;
        self
    }

    /// Registers an HTTP handler with explicit config.
    pub fn route_with<H>(
        mut self,
        method: Method,
        path_pattern: impl Into<String>,
        config: HandlerConfig,
        handler: H,
    ) -> Self
    where
        H: HttpHandlerFn,
    {
        let path_pattern = path_pattern.into();
        debug!(%method, path_pattern = %path_pattern, "Registered HTTP handler");
        self.http.push(HttpHandler {
            id: HandlerId::next(),
            method,
            path_pattern,
            config,
            meta: self.meta.clone(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn route<H: HttpHandlerFn>(
        self,
        method: Method,
        path_pattern: impl Into<String>,
        handler: H,
    ) -> Self {
        self.route_with(method, path_pattern, HandlerConfig::default(), handler)
    }

    pub fn get<H: HttpHandlerFn>(self, path_pattern: impl Into<String>, handler: H) -> Self {
        self.route(Method::Get, path_pattern, handler)
    }

    pub fn post<H: HttpHandlerFn>(self, path_pattern: impl Into<String>, handler: H) -> Self {
        self.route(Method::Post, path_pattern, handler)
    }

    pub fn put<H: HttpHandlerFn>(self, path_pattern: impl Into<String>, handler: H) -> Self {
        self.route(Method::Put, path_pattern, handler)
    }

    pub fn patch<H: HttpHandlerFn>(self, path_pattern: impl Into<String>, handler: H) -> Self {
        self.route(Method::Patch, path_pattern, handler)
    }

    pub fn delete<H: HttpHandlerFn>(self, path_pattern: impl Into<String>, handler: H) -> Self {
        self.route(Method::Delete, path_pattern, handler)
    }

    /// Registers an event handler with explicit config.
    pub fn on_with<H>(
        mut self,
        topic: impl Into<String>,
        event_type: impl Into<String>,
        config: HandlerConfig,
        handler: H,
    ) -> Self
    where
        H: EventHandlerFn,
    {
        let (topic, event_type) = (topic.into(), event_type.into());
        debug!(topic = %topic, event_type = %event_type, "Registered event handler");
        self.event.push(EventHandler {
            id: HandlerId::next(),
            topic,
            event_type,
            config,
            meta: self.meta.clone(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn on<H: EventHandlerFn>(
        self,
        topic: impl Into<String>,
        event_type: impl Into<String>,
        handler: H,
    ) -> Self {
        self.on_with(topic, event_type, HandlerConfig::default(), handler)
    }

    /// Registers a timer handler with explicit config.
    pub fn set_interval_with<H>(
        mut self,
        schedule: impl Into<String>,
        config: HandlerConfig,
        handler: H,
    ) -> Self
    where
        H: TimerHandlerFn,
    {
        let schedule = schedule.into();
        debug!(schedule = %schedule, "Registered timer handler");
        self.timer.push(TimerHandler {
            id: HandlerId::next(),
            schedule,
            config,
            meta: self.meta.clone(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn set_interval<H: TimerHandlerFn>(self, schedule: impl Into<String>, handler: H) -> Self {
        self.set_interval_with(schedule, HandlerConfig::default(), handler)
    }

    pub fn http_handlers(&self) -> &[HttpHandler] {
        &self.http
    }

    pub fn event_handlers(&self) -> &[EventHandler] {
        &self.event
    }

    pub fn timer_handlers(&self) -> &[TimerHandler] {
        &self.timer
    }

    /// Identity and match key of every handler of `kind`, in registration order.
    pub fn handlers(&self, kind: HandlerKind) -> Vec<(HandlerId, HandlerKey)> {
        match kind {
            HandlerKind::Http => self.http.iter().map(|h| (h.id, h.key())).collect(),
            HandlerKind::Event => self.event.iter().map(|h| (h.id, h.key())).collect(),
            HandlerKind::Timer => self.timer.iter().map(|h| (h.id, h.key())).collect(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("http", &self.http.len())
            .field("event", &self.event.len())
            .field("timer", &self.timer.len())
            .finish()
    }
}
