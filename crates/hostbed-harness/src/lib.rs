//! # Hostbed Harness
//!
//! Runs hosted handlers inside ordinary `cargo test` runs, without network,
//! message broker or wall clock.
//!
//! This crate provides:
//! - [`Harness`] and the per-test [`TestContext`] with its lifecycle guard
//! - Simulated HTTP requests, event publication and clock strikes
//! - A log sink that fails tests which log errors they did not expect
//! - A virtual clock and capture of emitted events
//!
//! # Example
//!
//! ```rust,ignore
//! use hostbed_harness::{Harness, HarnessConfig, RequestOptions};
//!
//! #[tokio::test]
//! async fn rejects_missing_key() -> HarnessResult<()> {
//!     let t = Harness::with_config(registry(), HarnessConfig::default()).begin()?;
//!     let response = t
//!         .allow_error_logs(|| t.request(RequestOptions::get("check")))
//!         .await?;
//!     assert_eq!(response.status, 401);
//!     t.finish()
//! }
//! ```

pub mod capture;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod harness;
pub mod logging;
pub mod resolver;
pub mod simulate;
pub mod sink;

pub use capture::{EmittedEvent, EventCapture, json_roundtrip};
pub use clock::VirtualClock;
pub use config::{ConfigLoader, HarnessConfig};
pub use context::{TestContext, TestScope};
pub use error::{ConfigError, ConfigResult, HarnessError, HarnessResult};
pub use harness::Harness;
pub use logging::{LoggingBuilder, init_test_logging};
pub use resolver::Resolver;
pub use simulate::{HttpResponse, RequestOptions, test_bearer_options};
pub use sink::{LogSink, level_string};
