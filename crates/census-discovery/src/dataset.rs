//! Dataset records: metadata loading, variable search, and data queries.
//!
//! A [`Dataset`] is built once from its catalog entry by fetching the linked
//! geography, variables, tags, and groups documents. Geography and variables
//! are required; a broken tags link leaves the tags empty; the groups link is
//! optional. Once loaded, the record is immutable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use census_core::util::ids::dataset_id_from_endpoint;
use census_core::{Error, JsonFetcher, Result};
use census_fts::{
    DatasetFields, FieldConstraint, IndexRow, SearchOptions, TextIndex, VariableFields,
    WriteSession,
};
use serde::de::DeserializeOwned;

use crate::model::{
    CatalogEntry, GeographyDocument, GeographyLevel, Group, GroupsDocument, TagsDocument,
    Variable, VariablesDocument, flatten_geographies,
};
use crate::table::Table;

// ============================================================================
// Load context
// ============================================================================

/// Shared collaborators for loading datasets during one discovery run.
pub struct LoadContext<'a> {
    /// API key attached to data queries.
    pub api_key: &'a str,
    /// Base URL stripped from endpoints to form dataset ids.
    pub base_url: &'a str,
    /// Fetcher for metadata and data queries.
    pub fetcher: &'a Arc<dyn JsonFetcher>,
    /// Variable index searched by [`Dataset::search_variables`].
    pub variable_index: &'a Arc<dyn TextIndex>,
    /// Open write session on `variable_index`.
    pub session: &'a WriteSession<'a>,
}

impl fmt::Debug for LoadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("base_url", &self.base_url)
            .field("fetcher", &self.fetcher.name())
            .field("variable_index", &self.variable_index.name())
            .finish()
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// One queryable dataset with its metadata.
pub struct Dataset {
    id: String,
    title: String,
    description: String,
    dataset_path: Vec<String>,
    vintage: Option<String>,
    endpoint: String,
    variables: BTreeMap<String, Variable>,
    geographies: Vec<GeographyLevel>,
    concepts: BTreeSet<String>,
    keywords: Vec<String>,
    tags: Vec<String>,
    groups: BTreeMap<String, Group>,
    api_key: String,
    fetcher: Arc<dyn JsonFetcher>,
    variable_index: Arc<dyn TextIndex>,
}

impl Dataset {
    /// Load a dataset from its catalog entry.
    ///
    /// On success the dataset's variable rows have been added to
    /// `ctx.session`.
    ///
    /// # Errors
    ///
    /// [`Error::Metadata`] if the entry has no usable API endpoint or lacks a
    /// geography or variables link; fetch errors from the geography,
    /// variables, or groups documents are propagated.
    pub async fn load(ctx: &LoadContext<'_>, entry: &CatalogEntry) -> Result<Self> {
        let endpoint = entry.api_endpoint()?.to_string();
        let id = dataset_id_from_endpoint(&endpoint, ctx.base_url);
        log::debug!("Loading metadata for dataset {id}");

        let geography_link = required_link(&id, "geography", entry.geography_link.as_deref())?;
        let document: GeographyDocument = fetch_document(ctx.fetcher, geography_link).await?;
        let geographies = flatten_geographies(document);

        let variables_link = required_link(&id, "variables", entry.variables_link.as_deref())?;
        let variables = fetch_document::<VariablesDocument>(ctx.fetcher, variables_link)
            .await?
            .variables;

        let tags = match entry.tags_link.as_deref() {
            Some(link) => match fetch_document::<TagsDocument>(ctx.fetcher, link).await {
                Ok(document) => document.tags,
                Err(e) => {
                    log::warn!("Unable to fetch tags for dataset {id}: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let groups = match entry.groups_link.as_deref() {
            Some(link) => load_groups(ctx.fetcher, link).await?,
            None => BTreeMap::new(),
        };

        let concepts = variables
            .values()
            .filter_map(|v| v.concept.as_deref())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        let dataset = Self {
            id,
            title: entry.title.clone(),
            description: entry.description.clone(),
            dataset_path: entry.dataset_path.clone(),
            vintage: entry.vintage.clone(),
            endpoint,
            variables,
            geographies,
            concepts,
            keywords: entry.keywords.clone(),
            tags,
            groups,
            api_key: ctx.api_key.to_string(),
            fetcher: Arc::clone(ctx.fetcher),
            variable_index: Arc::clone(ctx.variable_index),
        };

        let added = ctx.session.add(dataset.variable_rows())?;
        log::debug!("Indexed {added} variables for dataset {}", dataset.id);
        Ok(dataset)
    }

    /// Canonical dataset id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Long description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Classification path, general to specific.
    pub fn dataset_path(&self) -> &[String] {
        &self.dataset_path
    }

    /// Vintage, for year-scoped datasets.
    pub fn vintage(&self) -> Option<&str> {
        self.vintage.as_deref()
    }

    /// Base query URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Variables keyed by code.
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    /// Look up one variable.
    pub fn variable(&self, code: &str) -> Option<&Variable> {
        self.variables.get(code)
    }

    /// Geography levels, one per (scheme, level).
    pub fn geographies(&self) -> &[GeographyLevel] {
        &self.geographies
    }

    /// Distinct concept names across the variables.
    pub fn concepts(&self) -> &BTreeSet<String> {
        &self.concepts
    }

    /// Catalog keywords.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Tags; empty when the tags document was unavailable.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Variable groups keyed by name.
    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    /// Row for the dataset-level index.
    ///
    /// List-valued metadata is joined with spaces; the `variables` column
    /// holds variable labels.
    pub fn dataset_row(&self) -> IndexRow {
        IndexRow::Dataset(DatasetFields {
            dataset_id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            geographies: join_words(self.geographies.iter().map(|g| g.name.as_str())),
            concepts: join_words(self.concepts.iter().map(String::as_str)),
            keywords: self.keywords.join(" "),
            tags: self.tags.join(" "),
            variables: join_words(self.variables.values().map(|v| v.label.as_str())),
            vintage: self.vintage.clone(),
        })
    }

    fn variable_rows(&self) -> Vec<IndexRow> {
        self.variables
            .iter()
            .map(|(code, variable)| {
                IndexRow::Variable(VariableFields {
                    dataset_id: self.id.clone(),
                    variable: code.clone(),
                    group: variable.group.clone().unwrap_or_default(),
                    label: variable.label.clone(),
                    concept: variable.concept.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Search this dataset's variables.
    ///
    /// Unqualified terms search variable labels; `variable:`, `group:` and
    /// `concept:` qualify other fields. An empty query lists every variable.
    pub fn search_variables(
        &self,
        query: &str,
        constraints: &[FieldConstraint],
    ) -> Result<Vec<VariableMatch>> {
        let mut scoped = Vec::with_capacity(constraints.len() + 1);
        scoped.push(FieldConstraint::exact("dataset_id", &self.id));
        scoped.extend_from_slice(constraints);

        let hits = self
            .variable_index
            .query(query, &scoped, &SearchOptions::default())?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let row = hit.row.as_variable()?;
                Some(VariableMatch {
                    score: hit.score,
                    variable: row.variable.clone(),
                    group: row.group.clone(),
                    label: row.label.clone(),
                    concept: row.concept.clone(),
                })
            })
            .collect())
    }

    /// Run a data query against this dataset's endpoint.
    ///
    /// Requested fields and members of requested groups whose base variable
    /// is declared `int` or `float` are coerced to numbers.
    ///
    /// # Errors
    ///
    /// Fetch errors are propagated unchanged; a response that is not a
    /// header-plus-rows array yields [`Error::MalformedResponse`].
    pub async fn query(&self, query: &DataQuery) -> Result<Table> {
        let params = query.params(&self.api_key);
        log::debug!("Querying dataset {} with {} fields", self.id, query.fields.len());

        let response = self.fetcher.fetch(&self.endpoint, &params).await?;
        let mut table = Table::from_response(&response)?;

        let mut fields = query.fields.clone();
        for group in &query.groups {
            if let Some(members) = self.groups.get(group) {
                fields.extend(members.variables.iter().cloned());
            }
        }

        for field in &fields {
            let base = base_variable(field);
            if self.variables.get(base.as_str()).is_some_and(Variable::is_numeric) {
                table.coerce_numeric(field);
            }
        }
        Ok(table)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("vintage", &self.vintage)
            .field("variables", &self.variables.len())
            .field("geographies", &self.geographies.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

fn join_words<'s>(words: impl Iterator<Item = &'s str>) -> String {
    words.collect::<Vec<_>>().join(" ")
}

fn required_link<'e>(dataset: &str, kind: &str, link: Option<&'e str>) -> Result<&'e str> {
    link.filter(|l| !l.is_empty())
        .ok_or_else(|| Error::metadata(dataset, format!("catalog entry has no {kind} link")))
}

async fn fetch_document<T: DeserializeOwned>(fetcher: &Arc<dyn JsonFetcher>, url: &str) -> Result<T> {
    let value = fetcher.fetch(url, &[]).await?;
    serde_json::from_value(value).map_err(|source| Error::Json {
        url: url.to_string(),
        source,
    })
}

async fn load_groups(fetcher: &Arc<dyn JsonFetcher>, link: &str) -> Result<BTreeMap<String, Group>> {
    let document: GroupsDocument = fetch_document(fetcher, link).await?;

    let mut groups = BTreeMap::new();
    for entry in document.groups {
        let variables = match entry.variables.as_deref().filter(|l| !l.is_empty()) {
            Some(members) => fetch_document::<VariablesDocument>(fetcher, members)
                .await?
                .variables
                .into_keys()
                .collect(),
            None => Vec::new(),
        };
        groups.insert(
            entry.name,
            Group {
                description: entry.description,
                variables,
            },
        );
    }
    Ok(groups)
}

// ============================================================================
// Variable matches
// ============================================================================

/// A variable search result.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMatch {
    /// Relevance score, higher is better.
    pub score: f32,
    /// Variable code.
    pub variable: String,
    /// Group name.
    pub group: String,
    /// Label.
    pub label: String,
    /// Concept.
    pub concept: String,
}

// ============================================================================
// Data queries
// ============================================================================

/// Parameters of one data query.
///
/// ```rust
/// use census_discovery::DataQuery;
///
/// let query = DataQuery::new()
///     .fields(["NAME", "B01001_001E"])
///     .for_geo("county", "*")
///     .in_geo("state", "06");
/// assert_eq!(query.fields_list(), ["NAME", "B01001_001E"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataQuery {
    fields: Vec<String>,
    for_geo: Vec<(String, String)>,
    in_geo: Vec<(String, String)>,
    groups: Vec<String>,
}

impl DataQuery {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add requested variable codes.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add a `for` geography selector; `*` selects every instance.
    pub fn for_geo(mut self, level: impl Into<String>, selector: impl Into<String>) -> Self {
        self.for_geo.push((level.into(), selector.into()));
        self
    }

    /// Add an `in` parent geography constraint.
    pub fn in_geo(mut self, level: impl Into<String>, selector: impl Into<String>) -> Self {
        self.in_geo.push((level.into(), selector.into()));
        self
    }

    /// Request every variable of a group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Requested variable codes.
    pub fn fields_list(&self) -> &[String] {
        &self.fields
    }

    /// Requested groups.
    pub fn groups_list(&self) -> &[String] {
        &self.groups
    }

    /// Query-string parameters for the data API.
    pub fn params(&self, api_key: &str) -> Vec<(String, String)> {
        let get = self
            .fields
            .iter()
            .cloned()
            .chain(self.groups.iter().map(|g| format!("group({g})")))
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![("get".to_string(), get)];
        if !self.for_geo.is_empty() {
            params.push(("for".to_string(), geo_clause(&self.for_geo)));
        }
        if !self.in_geo.is_empty() {
            params.push(("in".to_string(), geo_clause(&self.in_geo)));
        }
        if !api_key.is_empty() {
            params.push(("key".to_string(), api_key.to_string()));
        }
        params
    }
}

fn geo_clause(selectors: &[(String, String)]) -> String {
    selectors
        .iter()
        .map(|(level, selector)| format!("{level}:{selector}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Base estimate variable of a derived column code.
///
/// A digit followed by `E` or `M` and an optional `A` maps to the `E`
/// estimate. Margin-of-error and annotation columns share the estimate's
/// type but are not listed in the variables document.
///
/// ```rust
/// use census_discovery::dataset::base_variable;
///
/// assert_eq!(base_variable("B01001_001M"), "B01001_001E");
/// assert_eq!(base_variable("B01001_001EA"), "B01001_001E");
/// assert_eq!(base_variable("POP"), "POP");
/// ```
pub fn base_variable(code: &str) -> String {
    let stem = code.strip_suffix('A').unwrap_or(code);
    match stem.strip_suffix(['E', 'M']) {
        Some(rest) if rest.ends_with(|c: char| c.is_ascii_digit()) => format!("{rest}E"),
        _ => code.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
