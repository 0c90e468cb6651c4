//! Per-test state and its lifecycle.
//!
//! A [`TestContext`] holds everything one test observes: its environment,
//! log sink, virtual clock and captured events. At most one context is live
//! per thread. libtest runs every test on its own thread, so each test gets
//! its own context while tests still run in parallel.
//!
//! [`TestScope`] owns the live context. Finishing or dropping the scope runs
//! the teardown checks:
//!
//! - a failing (panicking) test gets its log dumped
//! - a passing test that logged disallowed errors gets its log dumped and is
//!   failed with [`HarnessError::PolicyViolation`]
//! - work still in flight is cancelled

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hostbed_core::{ClientInfo, Context, HandlerConfig, LogEntry, Metadata};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::capture::{EmittedEvent, EventCapture};
use crate::clock::VirtualClock;
use crate::error::{HarnessError, HarnessResult};
use crate::harness::Harness;
use crate::sink::LogSink;

thread_local! {
    static ACTIVE: RefCell<Option<TestContext>> = const { RefCell::new(None) };
}

struct TestState {
    title: String,
    harness: Harness,
    env: RwLock<HashMap<String, String>>,
    sink: Arc<LogSink>,
    clock: Arc<VirtualClock>,
    capture: Arc<EventCapture>,
    root: Mutex<CancellationToken>,
}

/// Handle to the state of the running test.
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<TestState>,
}

impl TestContext {
    pub(crate) fn activate(
        harness: Harness,
        title: String,
        env: HashMap<String, String>,
    ) -> HarnessResult<Self> {
        let results_dir = harness.config().results_dir.clone();
        let context = Self {
            inner: Arc::new(TestState {
                title,
                harness,
                env: RwLock::new(env),
                sink: Arc::new(LogSink::new(results_dir)),
                clock: Arc::new(VirtualClock::new()),
                capture: Arc::new(EventCapture::new()),
                root: Mutex::new(CancellationToken::new()),
            }),
        };

        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(HarnessError::ContextExists);
            }
            *slot = Some(context.clone());
            Ok(())
        })?;

        debug!(title = %context.inner.title, "Test context created");
        Ok(context)
    }

    /// The context of the test running on this thread.
    pub fn current() -> HarnessResult<Self> {
        ACTIVE
            .with(|slot| slot.borrow().clone())
            .ok_or(HarnessError::NoActiveTest)
    }

    /// Whether a test context is live on this thread.
    pub fn is_active() -> bool {
        ACTIVE.with(|slot| slot.borrow().is_some())
    }

    fn release(&self) {
        let _ = ACTIVE.try_with(|slot| {
            slot.borrow_mut()
                .take_if(|active| Arc::ptr_eq(&active.inner, &self.inner));
        });
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn harness(&self) -> &Harness {
        &self.inner.harness
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// The test's current time.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn freeze_time(&self, instant: DateTime<Utc>) {
        self.inner.clock.freeze_time(instant);
    }

    pub fn unfreeze_time(&self) {
        self.inner.clock.unfreeze_time();
    }

    pub fn time_shift(&self, delta: TimeDelta) {
        self.inner.clock.time_shift(delta);
    }

    pub fn time_shift_to(&self, target: DateTime<Utc>) {
        self.inner.clock.time_shift_to(target);
    }

    // ========================================================================
    // Environment
    // ========================================================================

    /// A copy of the environment handlers will see.
    pub fn environment(&self) -> HashMap<String, String> {
        self.inner.env.read().clone()
    }

    /// Adds or replaces environment variables.
    pub fn set_environment<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner
            .env
            .write()
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    // ========================================================================
    // Log
    // ========================================================================

    pub fn sink(&self) -> &LogSink {
        &self.inner.sink
    }

    /// A copy of everything logged so far.
    pub fn logged_entries(&self) -> Vec<LogEntry> {
        self.inner.sink.entries()
    }

    /// Forgets logged entries and any recorded policy failure.
    pub fn clear_logged_entries(&self) {
        self.inner.sink.clear();
    }

    /// Runs `scope` with the error-log policy disabled.
    ///
    /// The policy is re-enabled when `scope` completes, fails, panics or is
    /// dropped early.
    pub async fn allow_error_logs<F, Fut, T>(&self, scope: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        struct Restore<'a>(&'a LogSink);

        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.0.set_fail_on_error_logs(true);
            }
        }

        self.inner.sink.set_fail_on_error_logs(false);
        let _restore = Restore(&self.inner.sink);
        scope().await
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// A copy of the events handlers emitted so far.
    pub fn emitted(&self) -> Vec<EmittedEvent> {
        self.inner.capture.emitted()
    }

    pub fn clear_emitted(&self) {
        self.inner.capture.clear();
    }

    // ========================================================================
    // Invocation contexts
    // ========================================================================

    /// Cancels every invocation started so far. Later invocations are not
    /// affected.
    pub fn cancel_in_flight(&self) {
        let old = std::mem::take(&mut *self.inner.root.lock());
        old.cancel();
    }

    /// Builds the execution context of one handler invocation.
    ///
    /// The context logs into this test's sink, emits into its capture, reads
    /// its clock and environment and is cancelled at teardown.
    pub fn mock_context(
        &self,
        client: ClientInfo,
        config: Option<&HandlerConfig>,
        meta: Option<&Metadata>,
    ) -> Arc<Context> {
        let harness = self.harness();
        let timeout = config
            .and_then(|c| c.timeout)
            .unwrap_or_else(|| harness.config().default_timeout());

        let context = Context::builder()
            .client(client)
            .transport(self.inner.sink.clone())
            .sender(self.inner.capture.clone())
            .config(HandlerConfig::with_timeout(timeout))
            .meta(meta.cloned().or_else(|| harness.default_meta()))
            .env(self.environment())
            .now(self.inner.clock.now_fn())
            .cancellation(self.inner.root.lock().child_token())
            .build();
        Arc::new(context)
    }

    /// Runs the teardown checks and leaves the thread's slot.
    fn teardown(&self, test_failed: bool) -> HarnessResult<()> {
        self.inner.root.lock().cancel();
        self.release();

        let sink = &self.inner.sink;
        let result = if test_failed {
            sink.dump_log(self.title());
            Ok(())
        } else if sink.failed() {
            sink.dump_log(self.title());
            Err(HarnessError::PolicyViolation {
                title: self.title().to_string(),
            })
        } else {
            Ok(())
        };
        sink.clear();
        result
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("title", &self.inner.title)
            .field("entries", &self.inner.sink.entries().len())
            .field("emitted", &self.inner.capture.len())
            .finish_non_exhaustive()
    }
}

/// Owns the live [`TestContext`] of a test.
///
/// Call [`finish`](Self::finish) at the end of the test to get teardown
/// failures as an error. A scope dropped without `finish` runs the same
/// checks and panics on a policy violation.
pub struct TestScope {
    context: TestContext,
    finished: bool,
}

impl TestScope {
    pub(crate) fn new(context: TestContext) -> Self {
        Self {
            context,
            finished: false,
        }
    }

    /// Ends the test.
    pub fn finish(mut self) -> HarnessResult<()> {
        self.finished = true;
        self.context.teardown(false)
    }

    /// A handle that stays usable inside spawned tasks.
    pub fn context(&self) -> TestContext {
        self.context.clone()
    }
}

impl Deref for TestScope {
    type Target = TestContext;

    fn deref(&self) -> &TestContext {
        &self.context
    }
}

impl Drop for TestScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let panicking = std::thread::panicking();
        if let Err(err) = self.context.teardown(panicking) {
            error!(error = %err, "Test teardown failed");
            panic!("{err}");
        }
    }
}

impl fmt::Debug for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScope")
            .field("context", &self.context)
            .field("finished", &self.finished)
            .finish()
    }
}
