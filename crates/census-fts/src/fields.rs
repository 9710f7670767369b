//! Row shapes stored in a text index.
//!
//! An index holds rows of exactly one [`FieldSet`] for its whole lifetime.
//! Each shape has a fixed, ordered field list, and each field has a
//! [`FieldKind`] deciding how its text is analyzed:
//!
//! | Shape | Field | Kind |
//! |-------|-------|------|
//! | Dataset | `dataset_id` | Id |
//! | Dataset | `title` | Keyword |
//! | Dataset | `description` | Text |
//! | Dataset | `geographies`, `concepts`, `keywords`, `tags`, `variables` | Keyword |
//! | Dataset | `vintage` | Id |
//! | Variable | `dataset_id`, `variable`, `group` | Id |
//! | Variable | `label`, `concept` | Text |

use serde::{Deserialize, Serialize};

/// How a field's value is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Whole value is one case-sensitive token.
    Id,
    /// Split into words, lowercased, stopwords removed.
    Keyword,
    /// Like `Keyword`, and stemmed by backends that support stemming.
    Text,
}

impl FieldKind {
    /// Returns `true` if prefix constraints are allowed on this kind.
    pub fn allows_prefix_constraint(self) -> bool {
        matches!(self, FieldKind::Id | FieldKind::Keyword)
    }
}

const DATASET_FIELDS: &[(&str, FieldKind)] = &[
    ("dataset_id", FieldKind::Id),
    ("title", FieldKind::Keyword),
    ("description", FieldKind::Text),
    ("geographies", FieldKind::Keyword),
    ("concepts", FieldKind::Keyword),
    ("keywords", FieldKind::Keyword),
    ("tags", FieldKind::Keyword),
    ("variables", FieldKind::Keyword),
    ("vintage", FieldKind::Id),
];

const VARIABLE_FIELDS: &[(&str, FieldKind)] = &[
    ("dataset_id", FieldKind::Id),
    ("variable", FieldKind::Id),
    ("group", FieldKind::Id),
    ("label", FieldKind::Text),
    ("concept", FieldKind::Text),
];

/// The row shape of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSet {
    /// One row per dataset.
    Dataset,
    /// One row per (dataset, variable) pair.
    Variable,
}

impl FieldSet {
    fn fields(self) -> &'static [(&'static str, FieldKind)] {
        match self {
            FieldSet::Dataset => DATASET_FIELDS,
            FieldSet::Variable => VARIABLE_FIELDS,
        }
    }

    /// Field names in declaration order.
    pub fn field_names(self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().map(|(name, _)| *name)
    }

    /// Field searched by unqualified query words.
    pub fn default_field(self) -> &'static str {
        match self {
            FieldSet::Dataset => "title",
            FieldSet::Variable => "label",
        }
    }

    /// Field holding the dataset id, shared by both shapes.
    pub fn key_field(self) -> &'static str {
        "dataset_id"
    }

    /// Kind of `name`, or `None` if the shape has no such field.
    pub fn field_kind(self, name: &str) -> Option<FieldKind> {
        self.fields()
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, kind)| *kind)
    }

    /// Returns `true` if `name` is a field of this shape.
    pub fn has_field(self, name: &str) -> bool {
        self.field_kind(name).is_some()
    }
}

impl std::fmt::Display for FieldSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSet::Dataset => write!(f, "dataset"),
            FieldSet::Variable => write!(f, "variable"),
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Fields of a dataset row. List-valued metadata is pre-joined with spaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFields {
    /// Canonical dataset id.
    pub dataset_id: String,
    /// Dataset title.
    pub title: String,
    /// Dataset description.
    pub description: String,
    /// Geography level names.
    pub geographies: String,
    /// Concept names.
    pub concepts: String,
    /// Catalog keywords.
    pub keywords: String,
    /// Tags.
    pub tags: String,
    /// Variable labels.
    pub variables: String,
    /// Vintage, for year-scoped datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vintage: Option<String>,
}

/// Fields of a variable row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableFields {
    /// Owning dataset id.
    pub dataset_id: String,
    /// Variable code.
    pub variable: String,
    /// Group name, empty when ungrouped.
    pub group: String,
    /// Variable label.
    pub label: String,
    /// Concept, empty when absent.
    pub concept: String,
}

/// One row of either shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum IndexRow {
    /// A dataset row.
    Dataset(DatasetFields),
    /// A variable row.
    Variable(VariableFields),
}

/// Separator between dataset id and variable code in variable row keys.
const KEY_SEPARATOR: char = '\u{1f}';

impl IndexRow {
    /// Shape of this row.
    pub fn field_set(&self) -> FieldSet {
        match self {
            IndexRow::Dataset(_) => FieldSet::Dataset,
            IndexRow::Variable(_) => FieldSet::Variable,
        }
    }

    /// Value of field `name`, or `None` if absent or not part of the shape.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            IndexRow::Dataset(d) => match name {
                "dataset_id" => Some(&d.dataset_id),
                "title" => Some(&d.title),
                "description" => Some(&d.description),
                "geographies" => Some(&d.geographies),
                "concepts" => Some(&d.concepts),
                "keywords" => Some(&d.keywords),
                "tags" => Some(&d.tags),
                "variables" => Some(&d.variables),
                "vintage" => d.vintage.as_deref(),
                _ => None,
            },
            IndexRow::Variable(v) => match name {
                "dataset_id" => Some(&v.dataset_id),
                "variable" => Some(&v.variable),
                "group" => Some(&v.group),
                "label" => Some(&v.label),
                "concept" => Some(&v.concept),
                _ => None,
            },
        }
    }

    /// Unique key: the dataset id, plus the variable code for variable rows.
    ///
    /// Adding a row whose key is already present replaces the old row.
    pub fn key(&self) -> String {
        match self {
            IndexRow::Dataset(d) => d.dataset_id.clone(),
            IndexRow::Variable(v) => format!("{}{KEY_SEPARATOR}{}", v.dataset_id, v.variable),
        }
    }

    /// Rebuild a row of `field_set` from a field lookup.
    ///
    /// Missing fields become empty strings, except `vintage` which becomes
    /// `None`.
    pub fn from_lookup<F>(field_set: FieldSet, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| lookup(name).unwrap_or_default();
        match field_set {
            FieldSet::Dataset => {
                let mut row = DatasetFields {
                    dataset_id: get("dataset_id"),
                    title: get("title"),
                    description: get("description"),
                    geographies: get("geographies"),
                    concepts: get("concepts"),
                    keywords: get("keywords"),
                    tags: get("tags"),
                    variables: get("variables"),
                    vintage: None,
                };
                let vintage = get("vintage");
                row.vintage = (!vintage.is_empty()).then_some(vintage);
                IndexRow::Dataset(row)
            }
            FieldSet::Variable => IndexRow::Variable(VariableFields {
                dataset_id: get("dataset_id"),
                variable: get("variable"),
                group: get("group"),
                label: get("label"),
                concept: get("concept"),
            }),
        }
    }

    /// Borrow the dataset fields, if this is a dataset row.
    pub fn as_dataset(&self) -> Option<&DatasetFields> {
        match self {
            IndexRow::Dataset(d) => Some(d),
            IndexRow::Variable(_) => None,
        }
    }

    /// Borrow the variable fields, if this is a variable row.
    pub fn as_variable(&self) -> Option<&VariableFields> {
        match self {
            IndexRow::Variable(v) => Some(v),
            IndexRow::Dataset(_) => None,
        }
    }
}

impl From<DatasetFields> for IndexRow {
    fn from(fields: DatasetFields) -> Self {
        IndexRow::Dataset(fields)
    }
}

impl From<VariableFields> for IndexRow {
    fn from(fields: VariableFields) -> Self {
        IndexRow::Variable(fields)
    }
}

/// A query result: a stored row and its relevance score.
///
/// Scores are higher-is-better; results are ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Relevance score.
    pub score: f32,
    /// The matching row with every stored field.
    pub row: IndexRow,
}

/// Sort hits best first, breaking score ties by row key, then truncate.
pub(crate) fn rank_hits(hits: &mut Vec<Hit>, limit: Option<usize>) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.row.key().cmp(&b.row.key()))
    });
    if let Some(limit) = limit {
        hits.truncate(limit);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn variable_row(dataset: &str, code: &str) -> IndexRow {
        IndexRow::Variable(VariableFields {
            dataset_id: dataset.to_string(),
            variable: code.to_string(),
            label: format!("Label for {code}"),
            ..Default::default()
        })
    }

    #[test]
    fn test_field_names_order() {
        let names: Vec<_> = FieldSet::Variable.field_names().collect();
        assert_eq!(names, ["dataset_id", "variable", "group", "label", "concept"]);
        assert_eq!(FieldSet::Dataset.field_names().count(), 9);
    }

    #[test]
    fn test_default_fields() {
        assert_eq!(FieldSet::Dataset.default_field(), "title");
        assert_eq!(FieldSet::Variable.default_field(), "label");
    }

    #[test]
    fn test_field_kind_lookup() {
        assert_eq!(FieldSet::Dataset.field_kind("title"), Some(FieldKind::Keyword));
        assert_eq!(FieldSet::Dataset.field_kind("description"), Some(FieldKind::Text));
        assert_eq!(FieldSet::Variable.field_kind("variable"), Some(FieldKind::Id));
        assert_eq!(FieldSet::Variable.field_kind("title"), None);
        assert!(!FieldSet::Dataset.has_field("label"));
    }

    #[test]
    fn test_prefix_constraint_kinds() {
        assert!(FieldKind::Id.allows_prefix_constraint());
        assert!(FieldKind::Keyword.allows_prefix_constraint());
        assert!(!FieldKind::Text.allows_prefix_constraint());
    }

    #[test]
    fn test_row_get() {
        let row = IndexRow::Dataset(DatasetFields {
            dataset_id: "2019/acs/acs5".to_string(),
            title: "ACS 5-Year".to_string(),
            ..Default::default()
        });
        assert_eq!(row.get("title"), Some("ACS 5-Year"));
        assert_eq!(row.get("vintage"), None);
        assert_eq!(row.get("label"), None);
        assert_eq!(row.field_set(), FieldSet::Dataset);
    }

    #[test]
    fn test_row_keys() {
        let a = variable_row("2019/acs/acs5", "B01001_001E");
        let b = variable_row("2019/acs/acs5", "B01001_002E");
        assert_ne!(a.key(), b.key());
        assert!(a.key().starts_with("2019/acs/acs5"));

        let d = IndexRow::Dataset(DatasetFields {
            dataset_id: "2019/acs/acs5".to_string(),
            ..Default::default()
        });
        assert_eq!(d.key(), "2019/acs/acs5");
    }

    #[test]
    fn test_from_lookup_roundtrip() {
        let original = IndexRow::Dataset(DatasetFields {
            dataset_id: "2010/dec/sf1".to_string(),
            title: "Decennial SF1".to_string(),
            vintage: Some("2010".to_string()),
            ..Default::default()
        });
        let rebuilt = IndexRow::from_lookup(FieldSet::Dataset, |name| {
            original.get(name).map(str::to_string)
        });
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_from_lookup_empty_vintage() {
        let row = IndexRow::from_lookup(FieldSet::Dataset, |_| Some(String::new()));
        assert_eq!(row.as_dataset().and_then(|d| d.vintage.clone()), None);
    }

    #[test]
    fn test_rank_hits_ties_break_by_key() {
        let mut hits = vec![
            Hit { score: 1.0, row: variable_row("d", "B") },
            Hit { score: 2.0, row: variable_row("d", "C") },
            Hit { score: 1.0, row: variable_row("d", "A") },
        ];
        rank_hits(&mut hits, Some(2));

        let codes: Vec<_> = hits.iter().map(|h| h.row.get("variable").unwrap()).collect();
        assert_eq!(codes, ["C", "A"]);
    }
}
