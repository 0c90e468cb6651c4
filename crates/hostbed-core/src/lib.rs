//! # Hostbed Core
//!
//! The contract between hosted service code and the host that runs it.
//!
//! This crate provides:
//! - A [`Registry`] of HTTP, event and timer handlers
//! - The per-invocation [`Context`] with its buffered [`Logger`]
//! - Dispatch entry points that enforce timeouts and map handler errors
//! - HTTP error helpers and a bearer-token seam
//!
//! Handlers are plain async functions returning `anyhow::Result`:
//!
//! ```rust,ignore
//! use hostbed_core::prelude::*;
//!
//! async fn greet(ctx: Arc<Context>, req: Request) -> anyhow::Result<Response> {
//!     let step = req.url.path_step_at(1).ok_or_else(|| missing(Some("step")))?;
//!     ctx.log().info("greeting");
//!     Ok(Response::json(&json!({ "step": step, "now": ctx.now() }))?)
//! }
//!
//! let registry = Registry::new().get("greeting/*", greet);
//! ```

pub mod bearer;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod json;
pub mod log;
pub mod registry;

pub use bearer::{
    BearerTokenOptions, TokenSigner, TokenVerifier, create_bearer_token, get_bearer,
};
pub use context::{Context, ContextBuilder, EventSender, NowFn, OutgoingEvent};
pub use dispatch::{EventEnvelope, TimerTrigger, execute_request, handle_event, trigger_timer};
pub use error::{EmitError, EmitResult, HostError, HttpError, missing};
pub use handler::{BoxFuture, EventHandlerFn, HttpHandlerFn, TimerHandlerFn};
pub use http::{ClientInfo, Method, Request, RequestBody, RequestUrl, Response};
pub use json::{array_spreadable, object_spreadable};
pub use log::{LogEntry, LogLevel, LogTransport, Logger};
pub use registry::{
    EventHandler, HandlerConfig, HandlerId, HandlerKey, HandlerKind, HttpHandler, Metadata,
    Registry, TimerHandler,
};

/// Everything a handler module usually needs.
pub mod prelude {
    pub use std::sync::Arc;

    pub use serde_json::json;

    pub use crate::{
        Context, EventEnvelope, HttpError, Method, Registry, Request, Response, TimerTrigger,
        array_spreadable, get_bearer, missing, object_spreadable,
    };
}
