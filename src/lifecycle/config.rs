//! Session configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! environment overrides:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RESOURCE_SDK_CACHE` | `cache_enabled` |
//! | `RESOURCE_SDK_SEQUENTIAL` | `sequential` |
//! | `RESOURCE_SDK_MAX_CONCURRENCY` | `max_concurrency` |
//!
//! ```toml
//! cache_enabled = true
//! sequential = false
//! max_concurrency = 8
//! log_filter = "info"
//! business_id = "6f1c2a8e-0d55-4b8e-9d7a-2f1f6c0b3a11"
//! ```

use crate::framework::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub const ENV_CACHE: &str = "RESOURCE_SDK_CACHE";
pub const ENV_SEQUENTIAL: &str = "RESOURCE_SDK_SEQUENTIAL";
pub const ENV_MAX_CONCURRENCY: &str = "RESOURCE_SDK_MAX_CONCURRENCY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Serve repeated listings from the cache and refuse alias collisions.
    pub cache_enabled: bool,
    /// Run every call immediately instead of batching writes.
    pub sequential: bool,
    /// Upper bound on concurrent remote calls during a flush.
    pub max_concurrency: usize,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
    /// The business the session operates on.
    pub business_id: Option<Uuid>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            sequential: false,
            max_concurrency: 8,
            log_filter: "info".to_string(),
            business_id: None,
        }
    }
}

impl SdkConfig {
    /// Defaults, then `path` if it exists, then environment overrides.
    pub async fn load(path: Option<&Path>) -> SdkResult<Self> {
        let config = match path {
            Some(path) if path.exists() => Self::load_from_file(path).await?,
            Some(path) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        let config = config.with_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads one TOML file. Missing keys keep their defaults.
    pub async fn load_from_file(path: &Path) -> SdkResult<Self> {
        let content = fs::read_to_string(path).await.map_err(|source| SdkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (the environment, in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> SdkResult<Self> {
        if let Some(value) = lookup(ENV_CACHE) {
            self.cache_enabled = parse_bool(ENV_CACHE, &value)?;
        }
        if let Some(value) = lookup(ENV_SEQUENTIAL) {
            self.sequential = parse_bool(ENV_SEQUENTIAL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = value.trim().parse().map_err(|_| {
                SdkError::Config(format!("{} must be a positive integer, got {:?}", ENV_MAX_CONCURRENCY, value))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.max_concurrency == 0 {
            return Err(SdkError::Config("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_business(mut self, id: Uuid) -> Self {
        self.business_id = Some(id);
        self
    }
}

fn parse_bool(name: &str, value: &str) -> SdkResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SdkError::Config(format!("{} must be a boolean, got {:?}", name, value))),
    }
}
