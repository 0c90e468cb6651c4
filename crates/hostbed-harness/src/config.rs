//! Harness configuration loaded with figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. `hostbed.toml` in the first search path that has one (feature `toml-config`)
//! 3. Environment variables (`HOSTBED_*`, `__` as separator)
//! 4. Programmatic overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use hostbed_harness::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//! let config = ConfigLoader::new()
//!     .file("tests/hostbed.toml")
//!     .without_env()
//!     .load()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{ConfigError, ConfigResult, HarnessError, HarnessResult};

/// Settings of the simulation harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Where failure log artifacts are written.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// `KEY=VALUE` file merged into every test environment.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Timeout applied to handlers that do not declare one.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Package name reported in handler metadata.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Revision reported in handler metadata.
    #[serde(default = "default_revision")]
    pub revision: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            env_file: default_env_file(),
            default_timeout_secs: default_timeout_secs(),
            service_name: None,
            revision: default_revision(),
        }
    }
}

impl HarnessConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Reads [`env_file`](Self::env_file). A missing file yields no variables.
    pub fn read_env_file(&self) -> HarnessResult<HashMap<String, String>> {
        match std::fs::read_to_string(&self.env_file) {
            Ok(text) => Ok(parse_env(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %self.env_file.display(), "No environment file");
                Ok(HashMap::new())
            }
            Err(source) => Err(HarnessError::Env {
                path: self.env_file.clone(),
                source,
            }),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("test/results")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("test/env.txt")
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_revision() -> String {
    "test-mock".to_string()
}

/// Parses `KEY=VALUE` lines; blank lines and `#` comments are skipped.
pub fn parse_env(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

// =============================================================================
// Loader
// =============================================================================

/// Layered loader for [`HarnessConfig`].
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a directory searched for `hostbed.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges overrides on top of every other source.
    pub fn merge(mut self, config: HarnessConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<HarnessConfig> {
        let figment = self.build_figment()?;
        let config: HarnessConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        debug!(
            results_dir = %config.results_dir.display(),
            env_file = %config.env_file.display(),
            "Harness configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(HarnessConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with HOSTBED_ prefix");
            figment = figment.merge(Env::prefixed("HOSTBED_").split("__"));
        }

        Ok(figment.merge(self.figment))
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    #[cfg_attr(not(feature = "toml-config"), allow(unused_mut))]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = if self.search_paths.is_empty() {
            std::env::current_dir().into_iter().collect()
        } else {
            self.search_paths.clone()
        };

        #[cfg(feature = "toml-config")]
        if let Some(path) = search_paths
            .iter()
            .map(|dir| dir.join("hostbed.toml"))
            .find(|path| path.exists())
        {
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
            return figment;
        }

        debug!(paths = search_paths.len(), "No configuration file found, using defaults");
        figment
    }
}
