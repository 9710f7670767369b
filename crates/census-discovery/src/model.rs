//! Serde models for catalog and per-dataset metadata documents.
//!
//! The Census API publishes one root catalog listing every dataset, and for
//! each dataset a handful of linked documents:
//!
//! | Link               | Document shape                                   |
//! |--------------------|--------------------------------------------------|
//! | `c_geographyLink`  | `{ "<scheme>": [GeographyLevel, ...], ... }`     |
//! | `c_variablesLink`  | `{ "variables": { "<code>": Variable, ... } }`   |
//! | `c_tagsLink`       | `{ "tags": ["...", ...] }`                       |
//! | `c_groupsLink`     | `{ "groups": [{ name, description, variables }] }` |
//!
//! Only the fields discovery uses are modelled; everything else is ignored.

use std::collections::BTreeMap;
use std::fmt;

use census_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Catalog
// ============================================================================

/// Root catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    /// Catalog entries; `None` when the document has no dataset list.
    #[serde(default)]
    pub dataset: Option<Vec<CatalogEntry>>,
}

/// One dataset as described by the root catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Dataset title.
    #[serde(default)]
    pub title: String,

    /// Long description.
    #[serde(default)]
    pub description: String,

    /// Classification path, general to specific.
    #[serde(rename = "c_dataset", default)]
    pub dataset_path: Vec<String>,

    /// Vintage for year-scoped datasets. The catalog uses both strings and
    /// numbers here.
    #[serde(
        rename = "c_vintage",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub vintage: Option<String>,

    /// Catalog keywords.
    #[serde(rename = "keyword", default)]
    pub keywords: Vec<String>,

    /// Access points; exactly one should be the queryable API.
    #[serde(default)]
    pub distribution: Vec<Distribution>,

    /// Geography document link.
    #[serde(rename = "c_geographyLink", default, skip_serializing_if = "Option::is_none")]
    pub geography_link: Option<String>,

    /// Variables document link.
    #[serde(rename = "c_variablesLink", default, skip_serializing_if = "Option::is_none")]
    pub variables_link: Option<String>,

    /// Tags document link.
    #[serde(rename = "c_tagsLink", default, skip_serializing_if = "Option::is_none")]
    pub tags_link: Option<String>,

    /// Groups document link.
    #[serde(rename = "c_groupsLink", default, skip_serializing_if = "Option::is_none")]
    pub groups_link: Option<String>,
}

/// A dataset access point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    /// Access format; `"API"` marks the queryable endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Access URL.
    #[serde(rename = "accessURL", default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
}

/// Distribution format of the queryable endpoint.
pub const API_FORMAT: &str = "API";

impl CatalogEntry {
    /// The queryable API endpoint of this entry.
    ///
    /// # Errors
    ///
    /// [`Error::Metadata`] if no distribution is marked `API`, or if several
    /// are marked `API` with different URLs.
    pub fn api_endpoint(&self) -> Result<&str> {
        let mut endpoints = self
            .distribution
            .iter()
            .filter(|d| d.format.as_deref() == Some(API_FORMAT))
            .filter_map(|d| d.access_url.as_deref());

        let first = endpoints
            .next()
            .ok_or_else(|| Error::metadata(&self.title, "no API distribution in catalog entry"))?;

        if let Some(other) = endpoints.find(|url| *url != first) {
            return Err(Error::metadata(
                &self.title,
                format!("conflicting API distributions: {first} and {other}"),
            ));
        }
        Ok(first)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// Variables
// ============================================================================

/// Declared value kind of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PredicateType {
    /// Integer values.
    Int,
    /// Floating point values.
    Float,
    /// Free text.
    String,
    /// The `for` geography clause.
    FipsFor,
    /// The `in` geography clause.
    FipsIn,
    /// ISO-8601 date/time values.
    Datetime,
    /// Anything the API adds later.
    Other(String),
}

impl PredicateType {
    /// Returns `true` for types whose query columns are coerced to numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PredicateType::Int | PredicateType::Float)
    }

    /// Wire name of the type.
    pub fn as_str(&self) -> &str {
        match self {
            PredicateType::Int => "int",
            PredicateType::Float => "float",
            PredicateType::String => "string",
            PredicateType::FipsFor => "fips-for",
            PredicateType::FipsIn => "fips-in",
            PredicateType::Datetime => "datetime",
            PredicateType::Other(other) => other,
        }
    }
}

impl From<String> for PredicateType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "int" => PredicateType::Int,
            "float" => PredicateType::Float,
            "string" => PredicateType::String,
            "fips-for" => PredicateType::FipsFor,
            "fips-in" => PredicateType::FipsIn,
            "datetime" => PredicateType::Datetime,
            _ => PredicateType::Other(value),
        }
    }
}

impl From<PredicateType> for String {
    fn from(value: PredicateType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PredicateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a dataset's variables document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Human-readable label.
    #[serde(default)]
    pub label: String,

    /// Concept the variable belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,

    /// Declared value kind; absent for some attribute columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate_type: Option<PredicateType>,

    /// Group name; the API uses `"N/A"` for ungrouped variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Maximum number of values the variable may be queried for.
    #[serde(default)]
    pub limit: i64,

    /// Whether the variable can only be used as a predicate.
    #[serde(default)]
    pub predicate_only: bool,

    /// Comma-separated annotation and margin-of-error columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,
}

impl Variable {
    /// Returns `true` if query columns for this variable are numeric.
    pub fn is_numeric(&self) -> bool {
        self.predicate_type.as_ref().is_some_and(PredicateType::is_numeric)
    }

    /// Annotation and margin-of-error column codes.
    pub fn attribute_codes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Variables document; also the shape of per-group member listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariablesDocument {
    /// Variables keyed by code.
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
}

// ============================================================================
// Geography
// ============================================================================

/// One summary level of a geography scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographyLevel {
    /// Scheme the level belongs to (e.g. `fips`); filled from the document key.
    #[serde(default)]
    pub scheme: String,

    /// Level name (e.g. `county`).
    #[serde(default)]
    pub name: String,

    /// Summary level code (e.g. `050`).
    #[serde(default, alias = "geoLevelDisplay", skip_serializing_if = "Option::is_none")]
    pub geo_level_id: Option<String>,

    /// Declared predicate type, when the document carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate_type: Option<PredicateType>,

    /// Reference date of the boundaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<String>,

    /// Parent levels that must be given in an `in` clause.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Parent levels that accept `*`.
    #[serde(default)]
    pub wildcard: Vec<String>,

    /// Parent level that may be omitted when wildcarding.
    #[serde(default, rename = "optionalWithWCFor", skip_serializing_if = "Option::is_none")]
    pub optional_with_wc_for: Option<String>,
}

impl GeographyLevel {
    /// Returns `true` if any parent level accepts a wildcard.
    pub fn allows_wildcard(&self) -> bool {
        !self.wildcard.is_empty()
    }
}

/// Geography document: levels keyed by scheme.
pub type GeographyDocument = BTreeMap<String, Vec<GeographyLevel>>;

/// Flatten a geography document into one row per (scheme, level).
pub fn flatten_geographies(document: GeographyDocument) -> Vec<GeographyLevel> {
    document
        .into_iter()
        .flat_map(|(scheme, levels)| {
            levels.into_iter().map(move |mut level| {
                level.scheme = scheme.clone();
                level
            })
        })
        .collect()
}

// ============================================================================
// Tags and groups
// ============================================================================

/// Tags document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsDocument {
    /// Tag strings.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Groups document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupsDocument {
    /// Group entries.
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

/// One entry of the groups document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupEntry {
    /// Group name (e.g. `B01001`).
    pub name: String,
    /// Group description.
    #[serde(default)]
    pub description: String,
    /// Link to the member variables document; may be empty.
    #[serde(default)]
    pub variables: Option<String>,
}

/// A named bundle of variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group description.
    pub description: String,
    /// Member variable codes.
    pub variables: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================
