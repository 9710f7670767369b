//! Census dataset discovery.
//!
//! Fetches the Census API catalog, loads the metadata of every dataset it
//! lists, indexes that metadata for full-text search, and exposes each
//! dataset as a queryable [`Dataset`].
//!
//! # Modules
//!
//! - [`model`]: serde models of the catalog and metadata documents
//! - [`dataset`]: dataset records, variable search, and data queries
//! - [`table`]: tabular data query results
//! - [`discovery`]: the discovery run and dataset search
//! - [`progress`]: discovery phases and progress counters

pub mod dataset;
pub mod discovery;
pub mod model;
pub mod progress;
pub mod table;

// Re-exports
pub use dataset::{DataQuery, Dataset, LoadContext, VariableMatch, base_variable};
pub use discovery::{DatasetMatch, Discovery, DiscoveryBuilder, DiscoveryReport, Scheduling};
pub use model::{CatalogEntry, GeographyLevel, Group, PredicateType, Variable};
pub use progress::{DiscoveryPhase, ProgressHandle};
pub use table::{Column, ColumnValues, Table};
