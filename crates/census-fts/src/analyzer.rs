//! Text analysis shared by every backend.
//!
//! Keyword and text fields are split on non-alphanumeric characters,
//! lowercased, and stripped of a short English stopword list. Positions are
//! assigned before stopword removal so phrase matching sees the gaps.
//!
//! ```rust
//! use census_fts::analyzer::analyze;
//! use census_fts::FieldKind;
//!
//! let tokens = analyze(FieldKind::Text, "Median Income in the Past 12 Months");
//! let words: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(words, ["median", "income", "past", "12", "months"]);
//! ```

use crate::fields::FieldKind;

/// Words dropped from keyword and text fields.
///
/// This is Whoosh's `analysis.STOP_WORDS` set minus "us", which names a
/// geography level. The Tantivy schema registers this same list through
/// `StopWordFilter::remove`, so both backends drop identical words.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "for", "from", "have", "if", "in",
    "is", "it", "may", "not", "of", "on", "or", "tbd", "that", "the", "this", "to", "we", "when",
    "will", "with", "yet", "you", "your",
];

/// Returns `true` if the lowercased `word` is a stopword.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// A token with its position in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Position counted over all words, stopwords included.
    pub position: usize,
    /// Normalized token text.
    pub text: String,
}

/// Analyze `text` the way a field of `kind` is indexed.
///
/// `Id` values become a single verbatim token; empty values produce no
/// tokens.
pub fn analyze(kind: FieldKind, text: &str) -> Vec<Token> {
    match kind {
        FieldKind::Id => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Token {
                    position: 0,
                    text: text.to_string(),
                }]
            }
        }
        FieldKind::Keyword | FieldKind::Text => text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .enumerate()
            .filter_map(|(position, word)| {
                let lower = word.to_lowercase();
                (!is_stopword(&lower)).then_some(Token {
                    position,
                    text: lower,
                })
            })
            .collect(),
    }
}

/// Normalize a prefix the way tokens of `kind` are normalized.
pub fn normalize_prefix(kind: FieldKind, prefix: &str) -> String {
    match kind {
        FieldKind::Id => prefix.to_string(),
        FieldKind::Keyword | FieldKind::Text => prefix.to_lowercase(),
    }
}

// ============================================================================
// Tests
// ============================================================================
