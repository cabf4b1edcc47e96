//! Client configuration.
//!
//! [`ClientConfig`] is read from an optional TOML file and then overridden
//! from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `CAMPUS_BOARD_BASE_URL` | `base_url` |
//! | `CAMPUS_BOARD_LANG` | `lang` |
//!
//! ```toml
//! base_url = "http://192.168.0.11:8080"
//! lang = "ko"
//! page_size = 20
//! stale_time_secs = 0
//! cache_time_secs = 300
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const BASE_URL_VAR: &str = "CAMPUS_BOARD_BASE_URL";
pub const LANG_VAR: &str = "CAMPUS_BOARD_LANG";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Cache timing used by the query client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long cached data counts as fresh. Zero means every cached value is
    /// served and immediately refetched.
    pub stale_time: Duration,
    /// How long an unobserved entry stays in memory.
    pub cache_time: Duration,
}

impl QueryConfig {
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend root, e.g. `http://192.168.0.11:8080`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Language tag sent with chat questions.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Posts requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub stale_time_secs: u64,

    #[serde(default = "default_cache_time")]
    pub cache_time_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            lang: default_lang(),
            page_size: default_page_size(),
            stale_time_secs: 0,
            cache_time_secs: default_cache_time(),
        }
    }
}

impl ClientConfig {
    /// Loads the file at `path` (defaults when `None`) and applies the
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loaded client config");
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(base_url) = lookup(BASE_URL_VAR) {
            self.base_url = base_url;
        }
        if let Some(lang) = lookup(LANG_VAR) {
            self.lang = lang;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".into()));
        }
        Ok(())
    }

    pub const fn query_config(&self) -> QueryConfig {
        QueryConfig::new(
            Duration::from_secs(self.stale_time_secs),
            Duration::from_secs(self.cache_time_secs),
        )
    }
}

fn default_base_url() -> String {
    "http://192.168.0.11:8080".to_string()
}

fn default_lang() -> String {
    "ko".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_cache_time() -> u64 {
    300 // five minutes
}
