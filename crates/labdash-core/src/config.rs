//! Runtime settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `labdash.toml`, then `LABDASH_*` environment variables
//! (e.g. `LABDASH_CACHE__FAILURE_POLICY=rollback`).

use std::time::Duration;

use anyhow::Result;
use config::Config;
use serde::Deserialize;

use crate::cache::DEFAULT_HIGHLIGHT_WINDOW;

/// What happens to an optimistic change when the gateway call fails.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave the optimistic change in place and mark the record failed
    #[default]
    Keep,
    /// Undo the optimistic change
    Rollback,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub highlight_window_secs: u64,
    pub refresh_after_mutation: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            highlight_window_secs: DEFAULT_HIGHLIGHT_WINDOW.as_secs(),
            refresh_after_mutation: true,
            failure_policy: FailurePolicy::Keep,
        }
    }
}

impl CacheConfig {
    pub fn highlight_window(&self) -> Duration {
        Duration::from_secs(self.highlight_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct DatabaseConfig {
    /// SQLite file; in-memory when unset
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct Settings {
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from `labdash.toml` (if present) and the environment.
    ///
    /// ## Errors
    /// Returns an error if a source cannot be read or a value has the wrong type.
    pub fn load() -> Result<Self> {
        Self::load_from("labdash")
    }

    /// Load settings using `file_stem` (without extension) as the optional TOML file.
    ///
    /// ## Errors
    /// Returns an error if a source cannot be read or a value has the wrong type.
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let defaults = CacheConfig::default();
        Ok(Config::builder()
            .set_default("cache.highlight_window_secs", defaults.highlight_window_secs)?
            .set_default("cache.refresh_after_mutation", defaults.refresh_after_mutation)?
            .set_default("cache.failure_policy", "keep")?
            .set_default("logging.level", LoggingConfig::default().level)?
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("LABDASH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?)
    }
}
