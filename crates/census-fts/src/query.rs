//! Query language shared by every backend.
//!
//! ```text
//! expr    := or
//! or      := and ("OR" and)*
//! and     := unary (["AND"] unary)*
//! unary   := ("NOT" | "-") unary | primary
//! primary := "(" expr ")"
//!          | FIELD ":" (word | phrase | "(" expr ")")
//!          | word | phrase
//! ```
//!
//! Unqualified words and phrases search the index's default field. A word
//! ending in `*` is a prefix match. Juxtaposed clauses are ANDed. An empty
//! query matches every row.
//!
//! # Example
//!
//! ```rust
//! use census_fts::query::{parse_query, QueryExpr};
//! use census_fts::FieldSet;
//!
//! let expr = parse_query("income keywords:acs", FieldSet::Dataset).unwrap();
//! assert_eq!(
//!     expr,
//!     QueryExpr::And(vec![
//!         QueryExpr::term("title", "income"),
//!         QueryExpr::term("keywords", "acs"),
//!     ])
//! );
//! ```

use census_core::{Error, Result};

use crate::fields::{FieldKind, FieldSet};

/// Parsed query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Matches every row.
    All,
    /// A single word in a field, or a prefix when `prefix` is set.
    Term {
        /// Field name.
        field: String,
        /// Word as written (prefix without the trailing `*`).
        text: String,
        /// Prefix match.
        prefix: bool,
    },
    /// Words that must appear in order.
    Phrase {
        /// Field name.
        field: String,
        /// Phrase text as written.
        text: String,
    },
    /// Every clause must match.
    And(Vec<QueryExpr>),
    /// At least one clause must match.
    Or(Vec<QueryExpr>),
    /// The clause must not match.
    Not(Box<QueryExpr>),
}

impl QueryExpr {
    /// Word term on `field`.
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryExpr::Term {
            field: field.into(),
            text: text.into(),
            prefix: false,
        }
    }

    /// Prefix term on `field`.
    pub fn prefix(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryExpr::Term {
            field: field.into(),
            text: text.into(),
            prefix: true,
        }
    }

    /// Phrase on `field`.
    pub fn phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryExpr::Phrase {
            field: field.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// Field constraints
// ============================================================================

/// How a constraint value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// The field equals the value (id fields) or contains it as a phrase.
    Exact,
    /// The field, or one of its words, starts with the value.
    Prefix,
}

/// A filter ANDed onto a query without affecting scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConstraint {
    /// Field name.
    pub field: String,
    /// Value to compare against.
    pub value: String,
    /// Comparison.
    pub kind: ConstraintKind,
}

impl FieldConstraint {
    /// Exact-match constraint.
    pub fn exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            kind: ConstraintKind::Exact,
        }
    }

    /// Prefix constraint.
    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            kind: ConstraintKind::Prefix,
        }
    }

    /// Check the constraint against a shape and lower it to a query clause.
    pub fn to_expr(&self, field_set: FieldSet) -> Result<QueryExpr> {
        let kind = field_set.field_kind(&self.field).ok_or_else(|| {
            Error::invalid_query(format!(
                "Unknown {field_set} field '{}' in constraint",
                self.field
            ))
        })?;

        match (self.kind, kind) {
            (ConstraintKind::Exact, FieldKind::Id) => Ok(QueryExpr::term(&self.field, &self.value)),
            (ConstraintKind::Exact, _) => Ok(QueryExpr::phrase(&self.field, &self.value)),
            (ConstraintKind::Prefix, kind) if kind.allows_prefix_constraint() => {
                Ok(QueryExpr::prefix(&self.field, &self.value))
            }
            (ConstraintKind::Prefix, _) => Err(Error::invalid_query(format!(
                "Prefix constraints are not supported on text field '{}'",
                self.field
            ))),
        }
    }
}

/// Scope an unqualified query to `field`.
///
/// A query containing no `:` is wrapped as `field:(query)`; anything else,
/// including a blank query, is returned unchanged.
///
/// ```rust
/// use census_fts::query::scope_to_field;
///
/// assert_eq!(scope_to_field("median income", "title"), "title:(median income)");
/// assert_eq!(scope_to_field("keywords:acs", "title"), "keywords:acs");
/// ```
pub fn scope_to_field(query: &str, field: &str) -> String {
    if query.contains(':') || query.trim().is_empty() {
        query.to_string()
    } else {
        format!("{field}:({})", query.trim())
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Field(String),
    Word(String),
    Phrase(String),
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"')
}

fn is_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn lex(input: &str) -> Result<Vec<Lexeme>> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Lexeme::LParen);
            }
            ')' => {
                chars.next();
                out.push(Lexeme::RParen);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(Error::invalid_query(format!(
                        "Unterminated phrase starting at offset {start}"
                    )));
                }
                out.push(Lexeme::Phrase(text));
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, next)) if !next.is_whitespace() => out.push(Lexeme::Not),
                    _ => return Err(Error::invalid_query("Dangling '-' in query")),
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                push_word(&mut out, word)?;
            }
        }
    }

    Ok(out)
}

/// Push a bare word, splitting `field:value` into a qualifier and a value.
fn push_word(out: &mut Vec<Lexeme>, word: String) -> Result<()> {
    match word.as_str() {
        "AND" => out.push(Lexeme::And),
        "OR" => out.push(Lexeme::Or),
        "NOT" => out.push(Lexeme::Not),
        _ => match word.split_once(':') {
            Some((field, value)) => {
                if !is_field_name(field) || value.contains(':') {
                    return Err(Error::invalid_query(format!(
                        "Invalid field qualifier in '{word}'"
                    )));
                }
                out.push(Lexeme::Field(field.to_string()));
                if !value.is_empty() {
                    out.push(Lexeme::Word(value.to_string()));
                }
            }
            None => out.push(Lexeme::Word(word)),
        },
    }
    Ok(())
}

// ============================================================================
// Parser
// ============================================================================

/// Parse `input` against the fields of `field_set`.
///
/// # Errors
///
/// Returns [`Error::InvalidQuery`] for unknown fields, unbalanced
/// parentheses or quotes, and dangling operators.
pub fn parse_query(input: &str, field_set: FieldSet) -> Result<QueryExpr> {
    let lexemes = lex(input)?;
    if lexemes.is_empty() {
        return Ok(QueryExpr::All);
    }

    let mut parser = Parser {
        lexemes,
        pos: 0,
        field_set,
    };
    let expr = parser.parse_or(field_set.default_field())?;
    if let Some(extra) = parser.peek() {
        return Err(Error::invalid_query(format!(
            "Unexpected {extra:?} in query '{input}'"
        )));
    }
    Ok(expr)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
    field_set: FieldSet,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn next(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn parse_or(&mut self, field: &str) -> Result<QueryExpr> {
        let mut clauses = vec![self.parse_and(field)?];
        while self.peek() == Some(&Lexeme::Or) {
            self.next();
            clauses.push(self.parse_and(field)?);
        }
        Ok(collapse(clauses, QueryExpr::Or))
    }

    fn parse_and(&mut self, field: &str) -> Result<QueryExpr> {
        let mut clauses = vec![self.parse_unary(field)?];
        loop {
            match self.peek() {
                None | Some(Lexeme::RParen) | Some(Lexeme::Or) => break,
                Some(Lexeme::And) => {
                    self.next();
                }
                Some(_) => {}
            }
            clauses.push(self.parse_unary(field)?);
        }
        Ok(collapse(clauses, QueryExpr::And))
    }

    fn parse_unary(&mut self, field: &str) -> Result<QueryExpr> {
        if self.peek() == Some(&Lexeme::Not) {
            self.next();
            return Ok(QueryExpr::Not(Box::new(self.parse_unary(field)?)));
        }
        self.parse_primary(field)
    }

    fn parse_primary(&mut self, field: &str) -> Result<QueryExpr> {
        match self.next() {
            Some(Lexeme::LParen) => self.parse_group(field),
            Some(Lexeme::Word(word)) => Ok(word_expr(field, &word)),
            Some(Lexeme::Phrase(text)) => Ok(QueryExpr::phrase(field, text)),
            Some(Lexeme::Field(name)) => {
                if !self.field_set.has_field(&name) {
                    return Err(Error::invalid_query(format!(
                        "Unknown {} field '{name}'",
                        self.field_set
                    )));
                }
                match self.next() {
                    Some(Lexeme::Word(word)) => Ok(word_expr(&name, &word)),
                    Some(Lexeme::Phrase(text)) => Ok(QueryExpr::phrase(name, text)),
                    Some(Lexeme::LParen) => self.parse_group(&name),
                    other => Err(Error::invalid_query(format!(
                        "Expected a value after '{name}:', found {other:?}"
                    ))),
                }
            }
            Some(other) => Err(Error::invalid_query(format!(
                "Unexpected {other:?} in query"
            ))),
            None => Err(Error::invalid_query("Query ends where a term was expected")),
        }
    }

    fn parse_group(&mut self, field: &str) -> Result<QueryExpr> {
        if self.peek() == Some(&Lexeme::RParen) {
            return Err(Error::invalid_query("Empty parentheses in query"));
        }
        let expr = self.parse_or(field)?;
        match self.next() {
            Some(Lexeme::RParen) => Ok(expr),
            _ => Err(Error::invalid_query("Unbalanced parentheses in query")),
        }
    }
}

fn word_expr(field: &str, word: &str) -> QueryExpr {
    match word.strip_suffix('*') {
        Some("") => QueryExpr::All,
        Some(prefix) => QueryExpr::prefix(field, prefix),
        None => QueryExpr::term(field, word),
    }
}

fn collapse(mut clauses: Vec<QueryExpr>, wrap: fn(Vec<QueryExpr>) -> QueryExpr) -> QueryExpr {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        wrap(clauses)
    }
}

// ============================================================================
// Tests
// ============================================================================
