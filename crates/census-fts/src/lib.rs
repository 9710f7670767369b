//! Metadata text indexes for Census discovery.
//!
//! This crate provides the [`TextIndex`] contract used to search dataset and
//! variable metadata, with a Tantivy backend (feature-gated) and an
//! in-memory fallback.
//!
//! # Features
//!
//! - `fts-tantivy`: Enable the Tantivy backend (default)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       census-fts                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TextIndex trait + WriteSession guard                       │
//! │  ├── MemoryIndex (TF-IDF, no stemming)                      │
//! │  └── TantivyIndex (BM25, stemming, persistent)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FieldSet / IndexRow (dataset and variable row shapes)      │
//! │  Query language (fields, AND/OR/NOT, phrases, prefixes)     │
//! │  Analyzer (tokenize, lowercase, stopwords)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use census_fts::{create_text_index, FieldSet, IndexConfig, SearchOptions, WriteSession};
//!
//! let index = create_text_index(&IndexConfig::default(), FieldSet::Dataset, "datasets")?;
//! let session = WriteSession::begin(index.as_ref())?;
//! session.add(rows)?;
//! session.commit()?;
//!
//! for hit in index.query("title:income", &[], &SearchOptions::default())? {
//!     println!("{:.2} {}", hit.score, hit.row.get("dataset_id").unwrap_or(""));
//! }
//! ```

// Core modules (always available)
pub mod analyzer;
pub mod backend;
pub mod fields;
pub mod memory;
pub mod query;
pub mod types;

// Feature-gated Tantivy modules
#[cfg(feature = "fts-tantivy")]
pub mod schema;

#[cfg(feature = "fts-tantivy")]
pub mod tantivy_index;

// Re-exports
pub use backend::{TextIndex, WriteSession, create_text_index};
pub use fields::{DatasetFields, FieldKind, FieldSet, Hit, IndexRow, VariableFields};
pub use memory::MemoryIndex;
pub use query::{FieldConstraint, QueryExpr, parse_query, scope_to_field};
pub use types::{IndexBackend, IndexConfig, SearchOptions};

#[cfg(feature = "fts-tantivy")]
pub use schema::IndexSchema;

#[cfg(feature = "fts-tantivy")]
pub use tantivy_index::TantivyIndex;
