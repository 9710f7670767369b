//! Tantivy text index backend.
//!
//! Provides `TantivyIndex`, the full-text backend with stemming and BM25
//! scoring. This module is only available with the `fts-tantivy` feature.
//!
//! Writes go through a single `IndexWriter` behind a mutex, so concurrent
//! `add` calls are serialized. Searches use a manually reloaded reader that
//! only ever sees committed segments.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use census_core::{Error, Result};
use tantivy::collector::TopDocs;
use tantivy::query::{
    AllQuery, BooleanQuery, ConstScoreQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::analyzer::normalize_prefix;
use crate::backend::{SessionFlags, TextIndex, check_shapes};
use crate::fields::{FieldKind, FieldSet, Hit, IndexRow, rank_hits};
use crate::query::{FieldConstraint, QueryExpr, parse_query};
use crate::schema::IndexSchema;
use crate::types::SearchOptions;

/// Index writer buffer size (20MB).
const WRITER_BUFFER_SIZE: usize = 20_000_000;

struct WriterState {
    writer: IndexWriter,
    flags: SessionFlags,
}

/// Tantivy-backed text index.
pub struct TantivyIndex {
    name: String,
    index: Index,
    schema: IndexSchema,
    reader: IndexReader,
    state: Mutex<WriterState>,
    path: Option<PathBuf>,
}

impl TantivyIndex {
    /// Create an empty index held in RAM.
    pub fn in_memory(field_set: FieldSet, name: impl Into<String>) -> Result<Self> {
        let schema = IndexSchema::build(field_set);
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(index, schema, SessionFlags::default(), name.into(), None)
    }

    /// Open the index stored at `path`, or create an empty one there.
    ///
    /// An existing index is queryable immediately; a new one becomes
    /// queryable after its first commit.
    pub fn open_or_create(path: &Path, field_set: FieldSet, name: impl Into<String>) -> Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| Error::io_with_path(e, path))?;
        }

        let (index, schema, flags) = if Self::index_exists(path) {
            let index = Index::open_in_dir(path)
                .map_err(|e| Error::index(format!("Failed to open index: {e}")))?;
            let schema = IndexSchema::from_schema(index.schema(), field_set)?;
            log::info!("Opened existing index at {}", path.display());
            (index, schema, SessionFlags::committed())
        } else {
            let schema = IndexSchema::build(field_set);
            let index = Index::create_in_dir(path, schema.schema().clone())
                .map_err(|e| Error::index(format!("Failed to create index: {e}")))?;
            log::info!("Created index at {}", path.display());
            (index, schema, SessionFlags::default())
        };

        Self::from_index(index, schema, flags, name.into(), Some(path.to_path_buf()))
    }

    /// Check if an index exists at the given path.
    pub fn index_exists(path: &Path) -> bool {
        path.join("meta.json").exists()
    }

    fn from_index(
        index: Index,
        schema: IndexSchema,
        flags: SessionFlags,
        name: String,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        IndexSchema::register_tokenizers(&index);

        let writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_BUFFER_SIZE)
            .map_err(|e| Error::index(format!("Failed to create index writer: {e}")))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| {
                Error::index(format!("Failed to create index reader: {e}"))
            })?;

        Ok(Self {
            name,
            index,
            schema,
            reader,
            state: Mutex::new(WriterState { writer, flags }),
            path,
        })
    }

    /// Directory of a persistent index.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.state
            .lock()
            .map_err(|_| Error::index(format!("Index '{}' writer lock poisoned", self.name)))
    }

    fn to_document(&self, row: &IndexRow) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        for (name, _, field) in self.schema.fields() {
            if let Some(value) = row.get(name).filter(|v| !v.is_empty()) {
                doc.add_text(field, value);
            }
        }
        doc.add_text(self.schema.key_field(), row.key());
        doc
    }

    fn to_row(&self, doc: &TantivyDocument) -> IndexRow {
        IndexRow::from_lookup(self.schema.field_set(), |name| {
            let (field, _) = self.schema.field(name)?;
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
    }

    fn resolve(&self, name: &str) -> Result<(Field, FieldKind)> {
        self.schema.field(name).ok_or_else(|| {
            Error::invalid_query(format!(
                "Unknown {} field '{name}'",
                self.schema.field_set()
            ))
        })
    }

    /// Run `text` through the field's own tokenizer.
    fn analyze(&self, field: Field, text: &str) -> Result<Vec<(usize, String)>> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(field)
            .map_err(|e| Error::index(format!("No tokenizer for field: {e}")))?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            let token = stream.token();
            tokens.push((token.position, token.text.clone()));
        }
        Ok(tokens)
    }

    /// Translate a query AST. `None` means the clause has no searchable
    /// words and is left out.
    fn compile(&self, expr: &QueryExpr) -> Result<Option<Box<dyn Query>>> {
        match expr {
            QueryExpr::All => Ok(Some(Box::new(AllQuery))),
            QueryExpr::Term {
                field,
                text,
                prefix: true,
            } => {
                let (field, kind) = self.resolve(field)?;
                let pattern = format!("{}.*", regex::escape(&normalize_prefix(kind, text)));
                let query = RegexQuery::from_pattern(&pattern, field)
                    .map_err(|e| Error::invalid_query(format!("Invalid prefix '{text}': {e}")))?;
                Ok(Some(Box::new(query)))
            }
            QueryExpr::Term { field, text, .. } | QueryExpr::Phrase { field, text } => {
                let (field, kind) = self.resolve(field)?;
                if kind == FieldKind::Id {
                    let term = Term::from_field_text(field, text);
                    return Ok(Some(Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
                }

                let tokens = self.analyze(field, text)?;
                let Some(&(first, _)) = tokens.first() else {
                    return Ok(None);
                };
                if tokens.len() == 1 {
                    let term = Term::from_field_text(field, &tokens[0].1);
                    return Ok(Some(Box::new(TermQuery::new(
                        term,
                        IndexRecordOption::WithFreqs,
                    ))));
                }
                let terms = tokens
                    .iter()
                    .map(|(position, token)| (position - first, Term::from_field_text(field, token)))
                    .collect();
                Ok(Some(Box::new(PhraseQuery::new_with_offset(terms))))
            }
            QueryExpr::And(clauses) => {
                let mut compiled: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for clause in clauses {
                    match clause {
                        QueryExpr::Not(inner) => {
                            if let Some(query) = self.compile(inner)? {
                                compiled.push((Occur::MustNot, query));
                            }
                        }
                        other => {
                            if let Some(query) = self.compile(other)? {
                                compiled.push((Occur::Must, query));
                            }
                        }
                    }
                }
                if compiled.is_empty() {
                    return Ok(None);
                }
                if compiled.iter().all(|(occur, _)| *occur == Occur::MustNot) {
                    compiled.push((Occur::Must, Box::new(AllQuery)));
                }
                Ok(Some(Box::new(BooleanQuery::new(compiled))))
            }
            QueryExpr::Or(clauses) => {
                let mut compiled: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for clause in clauses {
                    if let Some(query) = self.compile(clause)? {
                        compiled.push((Occur::Should, query));
                    }
                }
                Ok((!compiled.is_empty()).then(|| Box::new(BooleanQuery::new(compiled)) as Box<dyn Query>))
            }
            QueryExpr::Not(inner) => Ok(self.compile(inner)?.map(|query| {
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                    (Occur::MustNot, query),
                ])) as Box<dyn Query>
            })),
        }
    }
}

impl TextIndex for TantivyIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_set(&self) -> FieldSet {
        self.schema.field_set()
    }

    fn begin_write(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.flags.begin(&self.name)?;
        if let Err(e) = state.writer.delete_all_documents() {
            state.flags.finish(false);
            return Err(Error::index(format!("Failed to clear index: {e}")));
        }
        Ok(())
    }

    fn add(&self, rows: Vec<IndexRow>) -> Result<usize> {
        let state = self.lock()?;
        state.flags.ensure_open(&self.name)?;
        check_shapes(&self.name, self.schema.field_set(), &rows)?;

        for row in &rows {
            state
                .writer
                .delete_term(Term::from_field_text(self.schema.key_field(), &row.key()));
            state
                .writer
                .add_document(self.to_document(row))
                .map_err(|e| Error::index(format!("Failed to add document: {e}")))?;
        }
        Ok(rows.len())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.flags.ensure_open(&self.name)?;

        if let Err(e) = state.writer.commit() {
            // Leave the index at its last good commit
            if let Err(rollback) = state.writer.rollback() {
                log::warn!("Index '{}': rollback after failed commit failed: {rollback}", self.name);
            }
            state.flags.finish(false);
            return Err(Error::index(format!("Failed to commit index: {e}")));
        }
        state.flags.finish(true);
        self.reader
            .reload()
            .map_err(|e| Error::index(format!("Failed to reload index reader: {e}")))?;
        log::debug!(
            "Index '{}' committed with {} rows",
            self.name,
            self.reader.searcher().num_docs()
        );
        Ok(())
    }

    fn abort(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.flags.ensure_open(&self.name)?;
        state.flags.finish(false);
        state
            .writer
            .rollback()
            .map_err(|e| Error::index(format!("Failed to roll back index: {e}")))?;
        Ok(())
    }

    fn query(
        &self,
        query: &str,
        constraints: &[FieldConstraint],
        options: &SearchOptions,
    ) -> Result<Vec<Hit>> {
        self.lock()?.flags.ensure_queryable(&self.name)?;

        let field_set = self.schema.field_set();
        let Some(main) = self.compile(&parse_query(query, field_set)?)? else {
            return Ok(Vec::new());
        };

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, main)];
        for constraint in constraints {
            match self.compile(&constraint.to_expr(field_set)?)? {
                Some(filter) => clauses.push((
                    Occur::Must,
                    Box::new(ConstScoreQuery::new(filter, 0.0)),
                )),
                // A constraint with no searchable words matches nothing
                None => return Ok(Vec::new()),
            }
        }
        let combined: Box<dyn Query> = if clauses.len() == 1 {
            clauses.remove(0).1
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }
        let top_docs = searcher
            .search(&*combined, &TopDocs::with_limit(total))
            .map_err(|e| Error::index(format!("Search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc = searcher
                .doc::<TantivyDocument>(address)
                .map_err(|e| Error::index(format!("Failed to load document: {e}")))?;
            hits.push(Hit {
                score,
                row: self.to_row(&doc),
            });
        }

        rank_hits(&mut hits, options.limit);
        log::debug!("Index '{}': query '{query}' -> {} hits", self.name, hits.len());
        Ok(hits)
    }

    fn is_ready(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.flags.is_ready())
            .unwrap_or(false)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}

impl std::fmt::Debug for TantivyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyIndex")
            .field("name", &self.name)
            .field("field_set", &self.schema.field_set())
            .field("path", &self.path)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
