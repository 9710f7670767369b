//! Census Core: shared errors, configuration, and JSON fetching.
//!
//! This crate has no internal Census dependencies. Everything that talks to
//! the network goes through the [`JsonFetcher`] trait defined here.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`fetch`]: `JsonFetcher` trait with HTTP and caching implementations
//! - [`config`]: TOML configuration with environment overrides
//! - [`util`]: Dataset id and catalog URL utilities

pub mod config;
pub mod error;
pub mod fetch;
pub mod util;

// Re-export key types at crate root for convenience
pub use config::{CensusConfig, DiscoveryConfig, IndexBackend, IndexConfig, SchedulingMode};
pub use error::{Error, Result};
pub use fetch::{CacheStats, CachingFetcher, HttpConfig, HttpFetcher, JsonFetcher};

// Convenience re-exports from util
pub use util::ids::{DEFAULT_BASE_URL, catalog_url, dataset_id_from_endpoint};
