//! Entry points that run one handler invocation.
//!
//! Every entry point enforces the handler's timeout, turns panics into
//! errors, writes the closing `END` entry to the invocation's log and cancels
//! the invocation's token once it is over. None of them flush the log; that is
//! left to whoever built the context.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{Instrument, Level, debug, span};

use crate::context::Context;
use crate::error::{HostError, HttpError};
use crate::handler::BoxFuture;
use crate::http::{Request, Response};
use crate::log::LogLevel;
use crate::registry::{EventHandler, HttpHandler, TimerHandler};

/// What an event handler receives.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub subject: String,
    /// Decoded payload, shared read-only by every handler of the event.
    pub event: Option<Arc<Value>>,
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
}

/// What a timer handler receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTrigger {
    /// The scheduled instant that fired.
    pub trigger_time: DateTime<Utc>,
}

/// Runs an HTTP handler and always produces a response.
pub async fn execute_request(
    ctx: Arc<Context>,
    handler: &HttpHandler,
    request: Request,
) -> Response {
    let span = span!(
        Level::DEBUG,
        "dispatch",
        kind = "http",
        handler = %handler.id,
        method = %request.method,
        path = %request.url.path()
    );
    let timeout = ctx.config().timeout();
    let fut = handler.call(Arc::clone(&ctx), request);

    async move {
        let response = match guarded(timeout, fut).await {
            Ok(response) => {
                ctx.log().log(
                    LogLevel::Debug,
                    "Request END",
                    None,
                    Some(json!({ "status": response.status })),
                );
                response
            }
            Err(err) => {
                let response = error_response(&err);
                ctx.log().log(
                    LogLevel::Error,
                    "Request END",
                    Some(&err),
                    Some(json!({ "status": response.status })),
                );
                response
            }
        };
        ctx.cancellation().cancel();
        debug!(status = response.status, "Request finished");
        response
    }
    .instrument(span)
    .await
}

/// Runs an event handler. Returns whether it succeeded.
pub async fn handle_event(
    ctx: Arc<Context>,
    handler: &EventHandler,
    envelope: EventEnvelope,
) -> bool {
    let span = span!(
        Level::DEBUG,
        "dispatch",
        kind = "event",
        handler = %handler.id,
        topic = %handler.topic,
        event_type = %handler.event_type
    );
    let timeout = ctx.config().timeout();
    let fut = handler.call(Arc::clone(&ctx), envelope);

    async move {
        let ok = finish(&ctx, "Event END", guarded(timeout, fut).await);
        debug!(ok, "Event finished");
        ok
    }
    .instrument(span)
    .await
}

/// Runs a timer handler. Returns whether it succeeded.
pub async fn trigger_timer(
    ctx: Arc<Context>,
    handler: &TimerHandler,
    trigger: TimerTrigger,
) -> bool {
    let span = span!(
        Level::DEBUG,
        "dispatch",
        kind = "timer",
        handler = %handler.id,
        schedule = %handler.schedule
    );
    let timeout = ctx.config().timeout();
    let fut = handler.call(Arc::clone(&ctx), trigger);

    async move {
        let ok = finish(&ctx, "Timer END", guarded(timeout, fut).await);
        debug!(ok, "Timer finished");
        ok
    }
    .instrument(span)
    .await
}

fn finish(ctx: &Context, message: &str, result: anyhow::Result<()>) -> bool {
    let ok = match result {
        Ok(()) => {
            ctx.log().log(LogLevel::Debug, message, None, None);
            true
        }
        Err(err) => {
            ctx.log().log(LogLevel::Error, message, Some(&err), None);
            false
        }
    };
    ctx.cancellation().cancel();
    ok
}

/// Awaits `fut` under `timeout`, converting panics into errors.
async fn guarded<T>(
    timeout: Duration,
    fut: BoxFuture<'static, anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(HostError::TimedOut(timeout).into()),
        Ok(Err(panic)) => Err(HostError::Panicked(panic_message(panic.as_ref())).into()),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn error_response(err: &anyhow::Error) -> Response {
    if let Some(http) = err.downcast_ref::<HttpError>() {
        let response = Response::ok().with_status(http.status);
        return match &http.body {
            Some(body) => response
                .with_header("content-type", "application/json")
                .with_body(body.to_string()),
            None => response,
        };
    }
    let status = err.downcast_ref::<HostError>().map_or(500, HostError::status);
    Response::ok().with_status(status)
}
