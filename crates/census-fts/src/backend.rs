//! Text index trait, write sessions, and backend factory.
//!
//! Every backend follows the same lifecycle:
//!
//! 1. [`TextIndex::begin_write`] opens an exclusive write session and clears
//!    the previous contents.
//! 2. [`TextIndex::add`] may be called any number of times, from any number
//!    of tasks, while the session is open.
//! 3. [`TextIndex::commit`] makes the rows queryable, or
//!    [`TextIndex::abort`] restores the last committed state.
//!
//! Queries are only answered between sessions and after at least one commit.
//! [`WriteSession`] wraps steps 1-3 in a guard that aborts on drop.
//!
//! # Backends
//!
//! - `TantivyIndex`: Tantivy with stemming and BM25 (requires `fts-tantivy`)
//! - [`MemoryIndex`]: in-memory TF-IDF, no stemming
//!
//! # Example
//!
//! ```rust
//! use census_fts::{
//!     DatasetFields, FieldSet, IndexRow, MemoryIndex, SearchOptions, TextIndex, WriteSession,
//! };
//!
//! let index = MemoryIndex::new(FieldSet::Dataset, "datasets");
//! let session = WriteSession::begin(&index)?;
//! session.add(vec![IndexRow::Dataset(DatasetFields {
//!     dataset_id: "2019/acs/acs5".to_string(),
//!     title: "American Community Survey".to_string(),
//!     ..Default::default()
//! })])?;
//! session.commit()?;
//!
//! let hits = index.query("community", &[], &SearchOptions::default())?;
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), census_core::Error>(())
//! ```

use std::sync::Arc;

use census_core::{Error, Result};

use crate::fields::{FieldSet, Hit, IndexRow};
use crate::memory::MemoryIndex;
use crate::query::FieldConstraint;
use crate::types::{IndexBackend, IndexConfig, SearchOptions};

/// A full-text index over rows of one [`FieldSet`].
///
/// Implementations are internally synchronized; all methods take `&self`.
pub trait TextIndex: Send + Sync {
    /// Get the index name for diagnostics.
    fn name(&self) -> &str;

    /// Shape of the rows this index holds.
    fn field_set(&self) -> FieldSet;

    /// Open a write session, clearing the current contents.
    ///
    /// # Errors
    ///
    /// [`Error::Session`] if a session is already open.
    fn begin_write(&self) -> Result<()>;

    /// Add rows to the open session, replacing rows with the same key.
    ///
    /// Returns the number of rows added.
    ///
    /// # Errors
    ///
    /// [`Error::Session`] if no session is open or a row has the wrong shape.
    fn add(&self, rows: Vec<IndexRow>) -> Result<usize>;

    /// Commit the open session and make its rows queryable.
    fn commit(&self) -> Result<()>;

    /// Discard the open session, restoring the last committed contents.
    fn abort(&self) -> Result<()>;

    /// Run `query` with extra `constraints`, best match first.
    ///
    /// # Errors
    ///
    /// [`Error::Session`] before the first commit or while a session is
    /// open; [`Error::InvalidQuery`] for unparseable queries.
    fn query(
        &self,
        query: &str,
        constraints: &[FieldConstraint],
        options: &SearchOptions,
    ) -> Result<Vec<Hit>>;

    /// Returns `true` when queries can be answered.
    fn is_ready(&self) -> bool;

    /// Number of committed rows.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if no rows are committed.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// ============================================================================
// Session bookkeeping shared by backends
// ============================================================================

/// Open/committed flags enforcing the session rules.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SessionFlags {
    open: bool,
    committed: bool,
}

impl SessionFlags {
    pub(crate) fn committed() -> Self {
        Self {
            open: false,
            committed: true,
        }
    }

    pub(crate) fn begin(&mut self, index: &str) -> Result<()> {
        if self.open {
            return Err(Error::session(format!(
                "Index '{index}' already has an open write session"
            )));
        }
        self.open = true;
        Ok(())
    }

    pub(crate) fn ensure_open(&self, index: &str) -> Result<()> {
        if !self.open {
            return Err(Error::session(format!(
                "Index '{index}' has no open write session"
            )));
        }
        Ok(())
    }

    pub(crate) fn finish(&mut self, committed: bool) {
        self.open = false;
        self.committed |= committed;
    }

    pub(crate) fn ensure_queryable(&self, index: &str) -> Result<()> {
        if self.open {
            return Err(Error::session(format!(
                "Index '{index}' is being written and cannot be queried"
            )));
        }
        if !self.committed {
            return Err(Error::session(format!(
                "Index '{index}' has never been committed"
            )));
        }
        Ok(())
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.committed && !self.open
    }
}

/// Reject rows whose shape differs from the index's.
pub(crate) fn check_shapes(index: &str, field_set: FieldSet, rows: &[IndexRow]) -> Result<()> {
    match rows.iter().find(|row| row.field_set() != field_set) {
        Some(row) => Err(Error::session(format!(
            "Index '{index}' holds {field_set} rows, got a {} row",
            row.field_set()
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// WriteSession
// ============================================================================

/// Scoped write session over a [`TextIndex`].
///
/// Dropping the session without calling [`commit`](Self::commit) aborts
/// it. The guard can be shared by reference between concurrent tasks; the
/// index serializes their `add` calls.
pub struct WriteSession<'a> {
    index: &'a dyn TextIndex,
    finished: bool,
}

impl<'a> WriteSession<'a> {
    /// Open a write session on `index`.
    pub fn begin(index: &'a dyn TextIndex) -> Result<Self> {
        index.begin_write()?;
        log::debug!("Opened write session on index '{}'", index.name());
        Ok(Self {
            index,
            finished: false,
        })
    }

    /// Add rows to the session.
    pub fn add(&self, rows: Vec<IndexRow>) -> Result<usize> {
        self.index.add(rows)
    }

    /// Commit and close the session.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.index.commit()?;
        log::debug!("Committed index '{}'", self.index.name());
        Ok(())
    }

    /// Discard the session.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.index.abort()
    }

    /// The index being written.
    pub fn index(&self) -> &'a dyn TextIndex {
        self.index
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Write session on index '{}' dropped without commit, aborting",
                self.index.name()
            );
            if let Err(e) = self.index.abort() {
                log::warn!("Failed to abort index '{}': {e}", self.index.name());
            }
        }
    }
}

impl std::fmt::Debug for WriteSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("index", &self.index.name())
            .field("finished", &self.finished)
            .finish()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create a text index based on configuration.
///
/// Selection logic:
/// 1. `memory` → [`MemoryIndex`]
/// 2. `tantivy` with `fts-tantivy` enabled → `TantivyIndex`, persisted under
///    `<path>/<name>` when a path is configured, otherwise in RAM
/// 3. `tantivy` without the feature → [`MemoryIndex`] with a warning
///
/// # Errors
///
/// Returns an error if a persistent index cannot be created or opened.
pub fn create_text_index(
    config: &IndexConfig,
    field_set: FieldSet,
    name: &str,
) -> Result<Arc<dyn TextIndex>> {
    match config.backend {
        IndexBackend::Memory => Ok(Arc::new(MemoryIndex::new(field_set, name))),
        #[cfg(feature = "fts-tantivy")]
        IndexBackend::Tantivy => {
            let index = match &config.path {
                Some(path) => {
                    crate::tantivy_index::TantivyIndex::open_or_create(&path.join(name), field_set, name)?
                }
                None => crate::tantivy_index::TantivyIndex::in_memory(field_set, name)?,
            };
            Ok(Arc::new(index))
        }
        #[cfg(not(feature = "fts-tantivy"))]
        IndexBackend::Tantivy => {
            log::warn!("Tantivy backend requested for '{name}' without fts-tantivy, using memory");
            Ok(Arc::new(MemoryIndex::new(field_set, name)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
