//! Tantivy schema for the two row shapes.
//!
//! Every shape field becomes one stored Tantivy text field. Analysis depends
//! on the field kind:
//!
//! - `Id`: `STRING | STORED`, the whole value is one raw token
//! - `Keyword`: `census_keyword` tokenizer
//!   (SimpleTokenizer → LowerCaser → StopWordFilter)
//! - `Text`: `census_text` tokenizer
//!   (SimpleTokenizer → LowerCaser → StopWordFilter → Stemmer(English))
//!
//! A hidden, unstored `_key` field carries [`IndexRow::key`](crate::IndexRow::key)
//! so rows can be replaced by key.

use census_core::{Error, Result};
use tantivy::Index;
use tantivy::schema::{
    Field, IndexRecordOption, STRING, Schema, SchemaBuilder, STORED, TextFieldIndexing,
    TextOptions,
};
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer,
};

use crate::analyzer::STOPWORDS;
use crate::fields::{FieldKind, FieldSet};

/// Tokenizer name for keyword fields.
pub const KEYWORD_TOKENIZER: &str = "census_keyword";

/// Tokenizer name for stemmed text fields.
pub const TEXT_TOKENIZER: &str = "census_text";

/// Name of the hidden row-key field.
pub const KEY_FIELD: &str = "_key";

/// Tantivy schema plus typed field handles for one [`FieldSet`].
#[derive(Clone)]
pub struct IndexSchema {
    schema: Schema,
    field_set: FieldSet,
    fields: Vec<(&'static str, FieldKind, Field)>,
    key: Field,
}

impl IndexSchema {
    /// Build the schema for `field_set`.
    pub fn build(field_set: FieldSet) -> Self {
        let mut builder = SchemaBuilder::new();

        let fields = field_set
            .field_names()
            .filter_map(|name| {
                let kind = field_set.field_kind(name)?;
                let field = match kind {
                    FieldKind::Id => builder.add_text_field(name, STRING | STORED),
                    FieldKind::Keyword => builder.add_text_field(name, analyzed(KEYWORD_TOKENIZER)),
                    FieldKind::Text => builder.add_text_field(name, analyzed(TEXT_TOKENIZER)),
                };
                Some((name, kind, field))
            })
            .collect();
        let key = builder.add_text_field(KEY_FIELD, STRING);

        Self {
            schema: builder.build(),
            field_set,
            fields,
            key,
        }
    }

    /// Resolve field handles in the schema of an existing index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Index`] if the index was built for another shape.
    pub fn from_schema(schema: Schema, field_set: FieldSet) -> Result<Self> {
        let lookup = |name: &str| {
            schema.get_field(name).map_err(|_| {
                Error::index(format!(
                    "Existing index has no '{name}' field; it was not built for {field_set} rows"
                ))
            })
        };

        let mut fields = Vec::new();
        for name in field_set.field_names() {
            if let Some(kind) = field_set.field_kind(name) {
                fields.push((name, kind, lookup(name)?));
            }
        }
        let key = lookup(KEY_FIELD)?;

        Ok(Self {
            schema,
            field_set,
            fields,
            key,
        })
    }

    /// Get the underlying Tantivy schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Shape this schema was built for.
    pub fn field_set(&self) -> FieldSet {
        self.field_set
    }

    /// Handle and kind of field `name`.
    pub fn field(&self, name: &str) -> Option<(Field, FieldKind)> {
        self.fields
            .iter()
            .find(|(field_name, _, _)| *field_name == name)
            .map(|(_, kind, field)| (*field, *kind))
    }

    /// All shape fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldKind, Field)> + '_ {
        self.fields.iter().copied()
    }

    /// Hidden row-key field.
    pub fn key_field(&self) -> Field {
        self.key
    }

    /// Register the keyword and text tokenizers with an index.
    ///
    /// Must be called after creating or opening an index.
    pub fn register_tokenizers(index: &Index) {
        let keyword = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(stopwords()))
            .build();
        let text = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(stopwords()))
            .filter(Stemmer::new(Language::English))
            .build();

        index.tokenizers().register(KEYWORD_TOKENIZER, keyword);
        index.tokenizers().register(TEXT_TOKENIZER, text);
    }
}

fn analyzed(tokenizer: &str) -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(tokenizer)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored()
}

fn stopwords() -> Vec<String> {
    STOPWORDS.iter().map(|w| w.to_string()).collect()
}

impl std::fmt::Debug for IndexSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSchema")
            .field("field_set", &self.field_set)
            .field("fields", &self.fields.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
