//! Handler traits for the three kinds of hosted logic.
//!
//! Each trait has a blanket implementation for async functions and closures
//! with the matching signature, so plain `async fn`s can be registered
//! directly:
//!
//! ```rust,ignore
//! async fn greet(ctx: Arc<Context>, req: Request) -> anyhow::Result<Response> { .. }
//! async fn on_stuff(ctx: Arc<Context>, event: EventEnvelope) -> anyhow::Result<()> { .. }
//! async fn tick(ctx: Arc<Context>, trigger: TimerTrigger) -> anyhow::Result<()> { .. }
//!
//! let registry = Registry::new()
//!     .get("greeting/*", greet)
//!     .on("stuff", "happened", on_stuff)
//!     .set_interval("0 */1 * * *", tick);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::dispatch::{EventEnvelope, TimerTrigger};
use crate::http::{Request, Response};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// HTTP
// ============================================================================

/// Answers an HTTP request.
pub trait HttpHandlerFn: Send + Sync + 'static {
    fn call(&self, ctx: Arc<Context>, request: Request)
    -> BoxFuture<'static, anyhow::Result<Response>>;
}

impl<F, Fut> HttpHandlerFn for F
where
    F: Fn(Arc<Context>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    fn call(
        &self,
        ctx: Arc<Context>,
        request: Request,
    ) -> BoxFuture<'static, anyhow::Result<Response>> {
        Box::pin((self)(ctx, request))
    }
}

/// A type-erased HTTP handler.
pub type BoxedHttpHandler = Arc<dyn HttpHandlerFn>;

// ============================================================================
// Events
// ============================================================================

/// Reacts to a published event.
pub trait EventHandlerFn: Send + Sync + 'static {
    fn call(&self, ctx: Arc<Context>, event: EventEnvelope)
    -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> EventHandlerFn for F
where
    F: Fn(Arc<Context>, EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(
        &self,
        ctx: Arc<Context>,
        event: EventEnvelope,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self)(ctx, event))
    }
}

/// A type-erased event handler.
pub type BoxedEventHandler = Arc<dyn EventHandlerFn>;

// ============================================================================
// Timers
// ============================================================================

/// Runs when a schedule fires.
pub trait TimerHandlerFn: Send + Sync + 'static {
    fn call(&self, ctx: Arc<Context>, trigger: TimerTrigger)
    -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> TimerHandlerFn for F
where
    F: Fn(Arc<Context>, TimerTrigger) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(
        &self,
        ctx: Arc<Context>,
        trigger: TimerTrigger,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self)(ctx, trigger))
    }
}

/// A type-erased timer handler.
pub type BoxedTimerHandler = Arc<dyn TimerHandlerFn>;
