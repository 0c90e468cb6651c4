//! The entry point of a test suite.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hostbed_core::bearer::{BEARER_PRIVATE_KEY, BEARER_PUBLIC_KEY, test_keys};
use hostbed_core::{Metadata, Registry};
use serde_json::json;
use tracing::debug;

use crate::config::{ConfigLoader, HarnessConfig};
use crate::context::{TestContext, TestScope};
use crate::error::HarnessResult;
use crate::logging::init_test_logging;
use crate::resolver::Resolver;

struct HarnessInner {
    registry: Registry,
    resolver: Resolver,
    config: HarnessConfig,
}

/// Runs the handlers of a [`Registry`] without network, broker or clock.
///
/// A harness is cheap to clone and is usually kept in a `LazyLock` shared by
/// all tests of a binary:
///
/// ```rust,ignore
/// static HARNESS: LazyLock<Harness> =
///     LazyLock::new(|| Harness::with_config(service::registry(), HarnessConfig::default()));
///
/// #[tokio::test]
/// async fn greets() -> HarnessResult<()> {
///     let t = HARNESS.begin()?;
///     let response = t.request(RequestOptions::get("greeting/step")).await?;
///     assert_eq!(response.status, 200);
///     t.finish()
/// }
/// ```
#[derive(Clone)]
pub struct Harness {
    inner: Arc<HarnessInner>,
}

impl Harness {
    /// Creates a harness with configuration from the default sources.
    pub fn new(registry: Registry) -> HarnessResult<Self> {
        let config = ConfigLoader::new().load()?;
        Ok(Self::with_config(registry, config))
    }

    pub fn with_config(registry: Registry, config: HarnessConfig) -> Self {
        debug!(?registry, "Harness created");
        Self {
            inner: Arc::new(HarnessInner {
                registry,
                resolver: Resolver::new(),
                config,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    /// Metadata for handlers registered without any.
    pub(crate) fn default_meta(&self) -> Option<Metadata> {
        let config = self.config();
        config.service_name.as_ref().map(|name| Metadata {
            package_name: name.clone(),
            file_name: String::new(),
            revision: config.revision.clone(),
            config: json!({}),
        })
    }

    /// The environment every test starts with: the test key pair, overlaid
    /// with the environment file.
    pub fn initial_environment(&self) -> HarnessResult<HashMap<String, String>> {
        let mut env = HashMap::from([
            (BEARER_PUBLIC_KEY.to_string(), test_keys::PUBLIC_KEY.to_string()),
            (BEARER_PRIVATE_KEY.to_string(), test_keys::PRIVATE_KEY.to_string()),
        ]);
        env.extend(self.config().read_env_file()?);
        Ok(env)
    }

    /// Starts a test named after the current thread.
    ///
    /// Fails with [`ContextExists`](crate::HarnessError::ContextExists) while
    /// another test context is live on this thread.
    pub fn begin(&self) -> HarnessResult<TestScope> {
        let title = std::thread::current()
            .name()
            .unwrap_or("unnamed test")
            .to_string();
        self.begin_titled(title)
    }

    /// Starts a test with an explicit title.
    pub fn begin_titled(&self, title: impl Into<String>) -> HarnessResult<TestScope> {
        init_test_logging();
        let env = self.initial_environment()?;
        let context = TestContext::activate(self.clone(), title.into(), env)?;
        Ok(TestScope::new(context))
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
