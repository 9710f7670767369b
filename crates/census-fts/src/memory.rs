//! In-memory text index.
//!
//! `MemoryIndex` keeps rows in insertion order with a key → slot map, and
//! analyzes each field once on insert. Queries scan every row and score
//! matches with TF-IDF (`tf * ln(1 + N / df)` per clause, summed). There is
//! no stemming, so it is best suited to tests and small catalogs.

use std::collections::HashMap;
use std::sync::RwLock;

use census_core::{Error, Result};

use crate::analyzer::{Token, analyze, normalize_prefix};
use crate::backend::{SessionFlags, TextIndex, check_shapes};
use crate::fields::{FieldSet, Hit, IndexRow, rank_hits};
use crate::query::{FieldConstraint, QueryExpr, parse_query};
use crate::types::SearchOptions;

struct StoredRow {
    row: IndexRow,
    /// Analyzed tokens per field, in `FieldSet::field_names` order.
    tokens: Vec<Vec<Token>>,
}

#[derive(Default)]
struct Contents {
    rows: Vec<StoredRow>,
    slots: HashMap<String, usize>,
}

impl Contents {
    fn upsert(&mut self, field_set: FieldSet, row: IndexRow) {
        let tokens = field_set
            .field_names()
            .map(|name| match (field_set.field_kind(name), row.get(name)) {
                (Some(kind), Some(value)) => analyze(kind, value),
                _ => Vec::new(),
            })
            .collect();
        let key = row.key();
        let stored = StoredRow { row, tokens };

        match self.slots.get(&key) {
            Some(&slot) => self.rows[slot] = stored,
            None => {
                self.slots.insert(key, self.rows.len());
                self.rows.push(stored);
            }
        }
    }
}

struct MemoryState {
    flags: SessionFlags,
    live: Contents,
    /// Last committed contents, kept while a session is open.
    previous: Option<Contents>,
}

/// In-memory TF-IDF text index.
pub struct MemoryIndex {
    name: String,
    field_set: FieldSet,
    state: RwLock<MemoryState>,
}

impl MemoryIndex {
    /// Create an empty, never-committed index.
    pub fn new(field_set: FieldSet, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_set,
            state: RwLock::new(MemoryState {
                flags: SessionFlags::default(),
                live: Contents::default(),
                previous: None,
            }),
        }
    }

    fn poisoned(&self) -> Error {
        Error::index(format!("Index '{}' lock poisoned", self.name))
    }

    fn field_index(&self, field: &str) -> Result<usize> {
        self.field_set
            .field_names()
            .position(|name| name == field)
            .ok_or_else(|| {
                Error::invalid_query(format!("Unknown {} field '{field}'", self.field_set))
            })
    }

    fn compile(&self, expr: &QueryExpr, contents: &Contents) -> Result<Option<Matcher>> {
        let compiled = match expr {
            QueryExpr::All => Some(Matcher::All),
            QueryExpr::Term {
                field,
                text,
                prefix: true,
            } => {
                let slot = self.field_index(field)?;
                let kind = self.field_kind(field)?;
                Some(Matcher::leaf(
                    slot,
                    Pattern::Prefix(normalize_prefix(kind, text)),
                    contents,
                ))
            }
            QueryExpr::Term { field, text, .. } | QueryExpr::Phrase { field, text } => {
                let slot = self.field_index(field)?;
                let kind = self.field_kind(field)?;
                Pattern::from_tokens(analyze(kind, text))
                    .map(|pattern| Matcher::leaf(slot, pattern, contents))
            }
            QueryExpr::And(clauses) => self.compile_all(clauses, contents)?.map(Matcher::And),
            QueryExpr::Or(clauses) => self.compile_all(clauses, contents)?.map(Matcher::Or),
            QueryExpr::Not(inner) => self
                .compile(inner, contents)?
                .map(|m| Matcher::Not(Box::new(m))),
        };
        Ok(compiled)
    }

    fn compile_all(&self, clauses: &[QueryExpr], contents: &Contents) -> Result<Option<Vec<Matcher>>> {
        let mut compiled = Vec::with_capacity(clauses.len());
        for clause in clauses {
            if let Some(matcher) = self.compile(clause, contents)? {
                compiled.push(matcher);
            }
        }
        Ok((!compiled.is_empty()).then_some(compiled))
    }

    fn field_kind(&self, field: &str) -> Result<crate::fields::FieldKind> {
        self.field_set
            .field_kind(field)
            .ok_or_else(|| Error::invalid_query(format!("Unknown {} field '{field}'", self.field_set)))
    }
}

// ============================================================================
// Matching
// ============================================================================

enum Pattern {
    Word(String),
    Prefix(String),
    /// Tokens with offsets relative to the first one.
    Phrase(Vec<(usize, String)>),
}

impl Pattern {
    fn from_tokens(tokens: Vec<Token>) -> Option<Self> {
        let first = tokens.first()?.position;
        if tokens.len() == 1 {
            return tokens.into_iter().next().map(|t| Pattern::Word(t.text));
        }
        Some(Pattern::Phrase(
            tokens
                .into_iter()
                .map(|t| (t.position - first, t.text))
                .collect(),
        ))
    }

    /// Occurrences of the pattern in one field's tokens.
    fn count(&self, tokens: &[Token]) -> usize {
        match self {
            Pattern::Word(word) => tokens.iter().filter(|t| &t.text == word).count(),
            Pattern::Prefix(prefix) => tokens.iter().filter(|t| t.text.starts_with(prefix)).count(),
            Pattern::Phrase(parts) => {
                let Some((_, head)) = parts.first() else {
                    return 0;
                };
                tokens
                    .iter()
                    .filter(|start| &start.text == head)
                    .filter(|start| {
                        parts.iter().skip(1).all(|(offset, word)| {
                            tokens
                                .iter()
                                .any(|t| t.position == start.position + offset && &t.text == word)
                        })
                    })
                    .count()
            }
        }
    }
}

enum Matcher {
    All,
    Leaf { slot: usize, pattern: Pattern, idf: f32 },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    fn leaf(slot: usize, pattern: Pattern, contents: &Contents) -> Self {
        let total = contents.rows.len() as f32;
        let df = contents
            .rows
            .iter()
            .filter(|stored| pattern.count(&stored.tokens[slot]) > 0)
            .count()
            .max(1) as f32;
        Matcher::Leaf {
            slot,
            pattern,
            idf: (1.0 + total / df).ln(),
        }
    }

    /// Score of `stored`, or `None` if it does not match.
    fn score(&self, stored: &StoredRow) -> Option<f32> {
        match self {
            Matcher::All => Some(1.0),
            Matcher::Leaf { slot, pattern, idf } => {
                let tf = pattern.count(&stored.tokens[*slot]);
                (tf > 0).then(|| tf as f32 * idf)
            }
            Matcher::And(clauses) => clauses
                .iter()
                .map(|clause| clause.score(stored))
                .sum::<Option<f32>>(),
            Matcher::Or(clauses) => clauses
                .iter()
                .filter_map(|clause| clause.score(stored))
                .fold(None, |acc, s| Some(acc.unwrap_or(0.0) + s)),
            Matcher::Not(inner) => match inner.score(stored) {
                Some(_) => None,
                None => Some(0.0),
            },
        }
    }
}

// ============================================================================
// TextIndex
// ============================================================================

impl TextIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_set(&self) -> FieldSet {
        self.field_set
    }

    fn begin_write(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        state.flags.begin(&self.name)?;
        let committed = std::mem::take(&mut state.live);
        state.previous = Some(committed);
        Ok(())
    }

    fn add(&self, rows: Vec<IndexRow>) -> Result<usize> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        state.flags.ensure_open(&self.name)?;
        check_shapes(&self.name, self.field_set, &rows)?;

        let added = rows.len();
        for row in rows {
            state.live.upsert(self.field_set, row);
        }
        Ok(added)
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        state.flags.ensure_open(&self.name)?;
        state.previous = None;
        state.flags.finish(true);
        log::debug!(
            "Index '{}' committed with {} rows",
            self.name,
            state.live.rows.len()
        );
        Ok(())
    }

    fn abort(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        state.flags.ensure_open(&self.name)?;
        state.live = state.previous.take().unwrap_or_default();
        state.flags.finish(false);
        Ok(())
    }

    fn query(
        &self,
        query: &str,
        constraints: &[FieldConstraint],
        options: &SearchOptions,
    ) -> Result<Vec<Hit>> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        state.flags.ensure_queryable(&self.name)?;
        let contents = &state.live;

        let expr = parse_query(query, self.field_set)?;
        let mut filters = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            match self.compile(&constraint.to_expr(self.field_set)?, contents)? {
                Some(filter) => filters.push(filter),
                // A constraint with no searchable words matches nothing
                None => return Ok(Vec::new()),
            }
        }
        let Some(matcher) = self.compile(&expr, contents)? else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<Hit> = contents
            .rows
            .iter()
            .filter(|stored| filters.iter().all(|f| f.score(stored).is_some()))
            .filter_map(|stored| {
                matcher.score(stored).map(|score| Hit {
                    score,
                    row: stored.row.clone(),
                })
            })
            .collect();

        rank_hits(&mut hits, options.limit);
        log::debug!("Index '{}': query '{query}' -> {} hits", self.name, hits.len());
        Ok(hits)
    }

    fn is_ready(&self) -> bool {
        self.state
            .read()
            .map(|state| state.flags.is_ready())
            .unwrap_or(false)
    }

    fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        Ok(match &state.previous {
            Some(committed) => committed.rows.len(),
            None => state.live.rows.len(),
        })
    }
}

impl std::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("name", &self.name)
            .field("field_set", &self.field_set)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
