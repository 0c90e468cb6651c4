//! # Hostbed
//!
//! Host HTTP, event and timer handlers as plain async functions, and test
//! them without a network, a message broker or the wall clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────────┐
//! │  Test code   │────▶│   Harness    │────▶│ Resolver (cached matchers)   │
//! │ request/emit │     │ TestContext  │     └──────────────┬───────────────┘
//! │ clock_strikes│     │ sink · clock │                    ▼
//! └──────────────┘     │ capture      │◀────┌──────────────────────────────┐
//!                      └──────────────┘     │ execute_request/handle_event │
//!                                           │ trigger_timer ──▶ handlers   │
//!                                           └──────────────────────────────┘
//! ```
//!
//! - **Core**: registry, handler traits, execution context, dispatch entry points
//! - **Harness**: per-test state, log policy, virtual clock, event capture
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hostbed::prelude::*;
//!
//! async fn greet(ctx: Arc<Context>, req: Request) -> anyhow::Result<Response> {
//!     ctx.log().info("here");
//!     Ok(Response::json(&json!({ "step": req.url.path_step_at(1) }))?)
//! }
//!
//! #[tokio::test]
//! async fn greets() -> HarnessResult<()> {
//!     let registry = Registry::new().get("greeting/*", greet);
//!     let harness = Harness::with_config(registry, HarnessConfig::default());
//!     let t = harness.begin()?;
//!     let response = t.request(RequestOptions::get("greeting/step")).await?;
//!     assert_eq!(response.status, 200);
//!     t.finish()
//! }
//! ```
//!
//! ## Features
//!
//! - `testing`: Enable the simulation harness (default)
//! - `toml-config`: Read `hostbed.toml` (default)

pub use hostbed_core as core;
#[cfg(feature = "testing")]
pub use hostbed_harness as harness;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use hostbed::prelude::*;
/// ```
pub mod prelude {
    pub use hostbed_core::prelude::*;

    // Registration and invocation context
    pub use hostbed_core::{EmitError, HandlerConfig, LogLevel, Metadata, RequestBody};

    // Simulation harness
    #[cfg(feature = "testing")]
    pub use hostbed_harness::{
        EmittedEvent, Harness, HarnessConfig, HarnessError, HarnessResult, HttpResponse,
        RequestOptions, TestContext, TestScope,
    };
}
