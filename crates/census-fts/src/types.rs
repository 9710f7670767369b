//! Common types for the text index module.
//!
//! These types are used across all backends and are always available
//! regardless of feature flags.

use serde::{Deserialize, Serialize};

pub use census_core::config::{IndexBackend, IndexConfig};

/// Per-query options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum hits to return. `None` returns every match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Options capped at `limit` hits.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

// ============================================================================
// Tests
// ============================================================================
