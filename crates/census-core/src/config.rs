//! Client configuration.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! api_key = "..."
//! base_url = "https://api.census.gov/data"
//! vintage = "2019"
//!
//! [http]
//! retries = 3
//! timeout_secs = 30
//! cache_ttl_secs = 86400
//!
//! [discovery]
//! scheduling = "concurrent"
//! concurrency = 8
//!
//! [index]
//! backend = "tantivy"
//! path = "/var/cache/census/index"
//! ```
//!
//! Every key is optional. The API key can also come from the
//! `CENSUS_API_KEY` environment variable, which wins over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fetch::HttpConfig;
use crate::util::ids::DEFAULT_BASE_URL;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "CENSUS_API_KEY";

/// Environment variable pointing at a configuration file.
pub const CONFIG_PATH_ENV: &str = "CENSUS_CONFIG";

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusConfig {
    /// API key sent with data queries. Empty means anonymous.
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the data API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Restrict discovery to one vintage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vintage: Option<String>,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Discovery scheduling.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Text index backend.
    #[serde(default)]
    pub index: IndexConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            vintage: None,
            http: HttpConfig::default(),
            discovery: DiscoveryConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl CensusConfig {
    /// Default config file location: `<config dir>/census/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("census").join("config.toml"))
    }

    /// Resolve the config file path.
    ///
    /// An explicit path wins, then `CENSUS_CONFIG`, then the default
    /// location.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        Self::default_config_path()
    }

    /// Load configuration, applying environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read and parse one TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {}: {e}", path.display())))?;
        log::debug!("Loaded config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.api_key = key;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base_url must not be empty"));
        }
        if self.discovery.concurrency == 0 {
            return Err(Error::config("discovery.concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Serialize as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Discovery section
// ============================================================================

/// How per-dataset metadata loading is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// One dataset at a time, in catalog order.
    Sequential,
    /// Up to `concurrency` datasets in flight.
    #[default]
    Concurrent,
}

/// Discovery scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Scheduling mode.
    #[serde(default)]
    pub scheduling: SchedulingMode,

    /// Maximum datasets loaded at once in concurrent mode.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    8
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingMode::default(),
            concurrency: default_concurrency(),
        }
    }
}

// ============================================================================
// Index section
// ============================================================================

/// Text index backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Tantivy full-text engine.
    #[default]
    Tantivy,
    /// In-memory TF-IDF index.
    Memory,
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexBackend::Tantivy => write!(f, "tantivy"),
            IndexBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Text index settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend used for both the dataset and variable indexes.
    #[serde(default)]
    pub backend: IndexBackend,

    /// Directory for persistent indexes. `None` keeps them in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    /// In-memory configuration for the given backend.
    pub fn in_memory(backend: IndexBackend) -> Self {
        Self {
            backend,
            path: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
