//! Configuration management for require-loader
//!
//! Handles configuration loading, environment overrides and validation.
//! A loader snapshots its configuration once, when it is spawned; changing a
//! `LoaderConfig` afterwards has no effect on running loaders.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::loader::address::{normalize_base_path, AddressOptions};
use crate::utils::env::{env_bool, env_int, env_opt};

/// How the pending queue is re-examined after work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescanPolicy {
    /// Resume every queued context whose resource finished (default)
    Full,
    /// Only look at the most recently queued context after a context completes
    TailOnly,
}

impl Default for RescanPolicy {
    fn default() -> Self {
        Self::Full
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "require_loader=debug")
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Base path for relative resource names
    ///
    /// Defaults to the process working directory.
    #[serde(default)]
    pub base_path: Option<String>,

    /// Append a `?timestamp=` query to every resource address
    #[serde(default)]
    pub append_timestamp: bool,

    /// Track dependencies without ever activating resources
    #[serde(default)]
    pub passive: bool,

    /// Enable the loader's diagnostic trace
    #[serde(default)]
    pub logging: bool,

    /// Restore the previous registration slot occupant once all work drains
    #[serde(default)]
    pub no_conflict: bool,

    /// Extension appended to resource names that lack it
    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// Fail activations that take longer than this (milliseconds)
    #[serde(default)]
    pub activation_timeout_ms: Option<u64>,

    /// Pending queue rescan policy
    #[serde(default)]
    pub pending_rescan: RescanPolicy,

    /// Tracing subscriber configuration
    #[serde(default)]
    pub log: Option<LoggingConfig>,
}

fn default_extension() -> String {
    "json".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            append_timestamp: false,
            passive: false,
            logging: false,
            no_conflict: false,
            default_extension: default_extension(),
            activation_timeout_ms: None,
            pending_rescan: RescanPolicy::Full,
            log: None,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: LoaderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: LoaderConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, choosing JSON for `.json` files and TOML otherwise
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_file(path),
        }
    }

    /// Apply `REQUIRE_*` environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(base_path) = env_opt("REQUIRE_BASE_PATH") {
            self.base_path = Some(base_path);
        }
        if env_opt("REQUIRE_PASSIVE").is_some() {
            self.passive = env_bool("REQUIRE_PASSIVE");
        }
        if env_opt("REQUIRE_LOGGING").is_some() {
            self.logging = env_bool("REQUIRE_LOGGING");
        }
        if env_opt("REQUIRE_APPEND_TIMESTAMP").is_some() {
            self.append_timestamp = env_bool("REQUIRE_APPEND_TIMESTAMP");
        }
        if let Some(timeout) = env_int::<u64>("REQUIRE_ACTIVATION_TIMEOUT_MS") {
            self.activation_timeout_ms = Some(timeout);
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_extension.contains('/') || self.default_extension.contains('?') {
            return Err(anyhow::anyhow!(
                "default_extension must be a bare extension, got {:?}",
                self.default_extension
            ));
        }

        if self.activation_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!(
                "activation_timeout_ms must be greater than 0 when set"
            ));
        }

        if let Some(base_path) = &self.base_path {
            if base_path.contains('?') {
                return Err(anyhow::anyhow!(
                    "base_path must not carry a query string: {:?}",
                    base_path
                ));
            }
        }

        Ok(())
    }

    /// Base path with exactly one trailing separator
    pub fn resolved_base_path(&self) -> String {
        match &self.base_path {
            Some(base_path) => normalize_base_path(base_path),
            None => std::env::current_dir()
                .map(|dir| normalize_base_path(&dir.to_string_lossy()))
                .unwrap_or_default(),
        }
    }

    /// Address options for building resource locations
    pub fn address_options(&self) -> AddressOptions {
        AddressOptions::new(
            &self.resolved_base_path(),
            &self.default_extension,
            self.append_timestamp,
        )
    }

    pub fn activation_timeout(&self) -> Option<Duration> {
        self.activation_timeout_ms.map(Duration::from_millis)
    }
}
