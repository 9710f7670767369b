//! Discovery orchestration: catalog → datasets → indexes.
//!
//! [`Discovery::builder`] fetches the root catalog, loads every entry into a
//! [`Dataset`], and builds two text indexes: one row per variable (written
//! while datasets load, through one shared write session) and one row per
//! dataset (written once every dataset is loaded).
//!
//! A catalog that cannot be fetched or lists no datasets fails the whole run.
//! Any other failure only skips the affected dataset; it is logged and
//! counted in the [`DiscoveryReport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use census_core::{HttpConfig, HttpFetcher};
//! use census_discovery::{Discovery, Scheduling};
//!
//! let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default())?);
//! let discovery = Discovery::builder("my-key", fetcher)
//!     .vintage("2019")
//!     .scheduling(Scheduling::Concurrent { limit: 8 })
//!     .build()
//!     .await?;
//!
//! for found in discovery.search("population")? {
//!     println!("{:.2} {} {}", found.score, found.dataset_id, found.title);
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use census_core::util::ids::{catalog_url, dataset_id_from_endpoint};
use census_core::{
    CensusConfig, DEFAULT_BASE_URL, DiscoveryConfig, Error, JsonFetcher, Result, SchedulingMode,
};
use census_fts::{
    FieldSet, IndexConfig, SearchOptions, TextIndex, WriteSession, create_text_index,
    scope_to_field,
};
use futures::stream::{self, StreamExt};

use crate::dataset::{Dataset, LoadContext};
use crate::model::{Catalog, CatalogEntry};
use crate::progress::{DiscoveryPhase, ProgressHandle};

/// Index name for dataset rows.
pub const DATASET_INDEX_NAME: &str = "datasets";

/// Index name for variable rows.
pub const VARIABLE_INDEX_NAME: &str = "variables";

// ============================================================================
// Scheduling
// ============================================================================

/// How catalog entries are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    /// One dataset at a time.
    Sequential,
    /// Up to `limit` datasets in flight, sharing the variable write session.
    Concurrent {
        /// Maximum datasets loading at once.
        limit: usize,
    },
}

impl Default for Scheduling {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for Scheduling {
    fn from(config: &DiscoveryConfig) -> Self {
        match config.scheduling {
            SchedulingMode::Sequential => Scheduling::Sequential,
            SchedulingMode::Concurrent => Scheduling::Concurrent {
                limit: config.concurrency.max(1),
            },
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// A dataset search result.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMatch {
    /// Relevance score, higher is better.
    pub score: f32,
    /// Canonical dataset id.
    pub dataset_id: String,
    /// Title.
    pub title: String,
    /// Long description.
    pub description: String,
}

/// Counts from one discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Entries listed by the catalog.
    pub catalog_entries: usize,
    /// Datasets loaded and indexed.
    pub datasets_loaded: usize,
    /// Entries skipped because of per-dataset failures.
    pub datasets_failed: usize,
    /// Variable rows in the variable index.
    pub variables_indexed: usize,
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} catalog entries, {} datasets loaded, {} failed, {} variables indexed",
            self.catalog_entries, self.datasets_loaded, self.datasets_failed, self.variables_indexed
        )
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`Discovery`] run.
pub struct DiscoveryBuilder {
    api_key: String,
    fetcher: Arc<dyn JsonFetcher>,
    vintage: Option<String>,
    base_url: String,
    scheduling: Scheduling,
    dataset_index: Option<Arc<dyn TextIndex>>,
    variable_index: Option<Arc<dyn TextIndex>>,
    index_config: IndexConfig,
    progress: Option<ProgressHandle>,
}

impl DiscoveryBuilder {
    fn new(api_key: impl Into<String>, fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self {
            api_key: api_key.into(),
            fetcher,
            vintage: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            scheduling: Scheduling::default(),
            dataset_index: None,
            variable_index: None,
            index_config: IndexConfig::default(),
            progress: None,
        }
    }

    /// Only discover datasets of one vintage.
    pub fn vintage(mut self, vintage: impl Into<String>) -> Self {
        self.vintage = Some(vintage.into());
        self
    }

    /// Override the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Choose sequential or concurrent loading.
    pub fn scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Use `index` for dataset rows instead of one built from the index
    /// configuration.
    pub fn dataset_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.dataset_index = Some(index);
        self
    }

    /// Use `index` for variable rows instead of one built from the index
    /// configuration.
    pub fn variable_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.variable_index = Some(index);
        self
    }

    /// Backend and location for indexes not supplied directly.
    pub fn index_config(mut self, config: IndexConfig) -> Self {
        self.index_config = config;
        self
    }

    /// Report progress through `handle`.
    pub fn progress(mut self, handle: ProgressHandle) -> Self {
        self.progress = Some(handle);
        self
    }

    /// Run discovery.
    ///
    /// # Errors
    ///
    /// [`Error::Catalog`] if the catalog cannot be fetched or lists no
    /// datasets; [`Error::Config`] if a supplied index has the wrong shape;
    /// index errors while opening or committing either index.
    pub async fn build(self) -> Result<Discovery> {
        let progress = self
            .progress
            .clone()
            .unwrap_or_else(|| ProgressHandle::new("census"));

        match self.run(&progress).await {
            Ok(discovery) => {
                log::info!("Discovery ready: {}", discovery.report);
                progress.set_phase(DiscoveryPhase::Ready);
                Ok(discovery)
            }
            Err(e) => {
                progress.set_phase(DiscoveryPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(self, progress: &ProgressHandle) -> Result<Discovery> {
        let dataset_index = self.resolve_index(self.dataset_index.clone(), FieldSet::Dataset)?;
        let variable_index = self.resolve_index(self.variable_index.clone(), FieldSet::Variable)?;

        progress.set_phase(DiscoveryPhase::FetchingCatalog);
        let entries = self.fetch_catalog().await?;
        let catalog_entries = entries.len();
        let entries = dedupe_entries(entries, &self.base_url);

        progress.set_phase(DiscoveryPhase::ProcessingDatasets);
        let mut datasets = BTreeMap::new();
        let datasets_failed;
        {
            let session = WriteSession::begin(variable_index.as_ref())?;
            let ctx = LoadContext {
                api_key: &self.api_key,
                base_url: &self.base_url,
                fetcher: &self.fetcher,
                variable_index: &variable_index,
                session: &session,
            };

            let results: Vec<Option<Dataset>> = match self.scheduling {
                Scheduling::Sequential => {
                    let mut results = Vec::with_capacity(entries.len());
                    for entry in &entries {
                        results.push(load_one(&ctx, entry, progress).await);
                    }
                    results
                }
                Scheduling::Concurrent { limit } => {
                    stream::iter(entries.iter().map(|entry| load_one(&ctx, entry, progress)))
                        .buffer_unordered(limit.max(1))
                        .collect()
                        .await
                }
            };

            datasets_failed = results.iter().filter(|r| r.is_none()).count();
            datasets.extend(
                results
                    .into_iter()
                    .flatten()
                    .map(|dataset| (dataset.id().to_string(), dataset)),
            );
            session.commit()?;
        }
        progress.set_phase(DiscoveryPhase::Indexed);

        let session = WriteSession::begin(dataset_index.as_ref())?;
        session.add(datasets.values().map(Dataset::dataset_row).collect())?;
        session.commit()?;

        let report = DiscoveryReport {
            catalog_entries,
            datasets_loaded: datasets.len(),
            datasets_failed,
            variables_indexed: variable_index.len()?,
        };

        Ok(Discovery {
            datasets,
            dataset_index,
            variable_index,
            report,
            progress: progress.clone(),
        })
    }

    fn resolve_index(
        &self,
        supplied: Option<Arc<dyn TextIndex>>,
        field_set: FieldSet,
    ) -> Result<Arc<dyn TextIndex>> {
        let name = match field_set {
            FieldSet::Dataset => DATASET_INDEX_NAME,
            FieldSet::Variable => VARIABLE_INDEX_NAME,
        };
        match supplied {
            Some(index) if index.field_set() != field_set => Err(Error::config(format!(
                "Index '{}' holds {} rows, expected {field_set}",
                index.name(),
                index.field_set()
            ))),
            Some(index) => Ok(index),
            None => create_text_index(&self.index_config, field_set, name),
        }
    }

    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let url = catalog_url(&self.base_url, self.vintage.as_deref());
        log::debug!("Fetching catalog {url}");

        let value = self
            .fetcher
            .fetch(&url, &[])
            .await
            .map_err(|e| Error::catalog_with_source(format!("Unable to fetch catalog {url}"), e))?;
        let catalog: Catalog = serde_json::from_value(value).map_err(|source| {
            Error::catalog_with_source(
                format!("Unable to parse catalog {url}"),
                Error::Json {
                    url: url.clone(),
                    source,
                },
            )
        })?;

        match catalog.dataset {
            Some(entries) if !entries.is_empty() => {
                log::info!("Catalog {url} lists {} datasets", entries.len());
                Ok(entries)
            }
            _ => Err(Error::catalog(format!(
                "Unable to identify datasets from catalog {url}"
            ))),
        }
    }
}

/// Drop catalog entries whose dataset id reappears later in the catalog.
///
/// The last entry for an id wins. Entries without a usable endpoint are kept
/// so their load fails and is counted.
fn dedupe_entries(entries: Vec<CatalogEntry>, base_url: &str) -> Vec<CatalogEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Option<CatalogEntry>> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Ok(endpoint) = entry.api_endpoint() {
            let id = dataset_id_from_endpoint(endpoint, base_url);
            if let Some(previous) = positions.insert(id.clone(), kept.len()) {
                log::warn!("Duplicate dataset id {id}; keeping the later catalog entry");
                kept[previous] = None;
            }
        }
        kept.push(Some(entry));
    }
    kept.into_iter().flatten().collect()
}

async fn load_one(
    ctx: &LoadContext<'_>,
    entry: &CatalogEntry,
    progress: &ProgressHandle,
) -> Option<Dataset> {
    match Dataset::load(ctx, entry).await {
        Ok(dataset) => {
            progress.record_loaded();
            Some(dataset)
        }
        Err(e) => {
            let endpoint = entry.api_endpoint().unwrap_or("<no API endpoint>");
            log::warn!(
                "Error processing metadata; skipping dataset '{}' ({endpoint}): {e}",
                entry.title
            );
            progress.record_failed();
            None
        }
    }
}

impl fmt::Debug for DiscoveryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryBuilder")
            .field("fetcher", &self.fetcher.name())
            .field("vintage", &self.vintage)
            .field("base_url", &self.base_url)
            .field("scheduling", &self.scheduling)
            .field("index_config", &self.index_config)
            .finish()
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Discovered datasets and their metadata indexes.
pub struct Discovery {
    datasets: BTreeMap<String, Dataset>,
    dataset_index: Arc<dyn TextIndex>,
    variable_index: Arc<dyn TextIndex>,
    report: DiscoveryReport,
    progress: ProgressHandle,
}

impl Discovery {
    /// Start building a discovery run.
    pub fn builder(api_key: impl Into<String>, fetcher: Arc<dyn JsonFetcher>) -> DiscoveryBuilder {
        DiscoveryBuilder::new(api_key, fetcher)
    }

    /// Start a builder preset from configuration.
    pub fn from_config(config: &CensusConfig, fetcher: Arc<dyn JsonFetcher>) -> DiscoveryBuilder {
        let mut builder = DiscoveryBuilder::new(config.api_key.clone(), fetcher)
            .base_url(config.base_url.clone())
            .scheduling(Scheduling::from(&config.discovery))
            .index_config(config.index.clone());
        if let Some(vintage) = &config.vintage {
            builder = builder.vintage(vintage.clone());
        }
        builder
    }

    /// Search datasets, best match first.
    ///
    /// A query without any `field:` qualifier searches titles only.
    pub fn search(&self, query: &str) -> Result<Vec<DatasetMatch>> {
        self.search_with(query, &SearchOptions::default())
    }

    /// Search datasets with explicit options.
    pub fn search_with(&self, query: &str, options: &SearchOptions) -> Result<Vec<DatasetMatch>> {
        let scoped = scope_to_field(query, FieldSet::Dataset.default_field());
        let hits = self.dataset_index.query(&scoped, &[], options)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let row = hit.row.as_dataset()?;
                Some(DatasetMatch {
                    score: hit.score,
                    dataset_id: row.dataset_id.clone(),
                    title: row.title.clone(),
                    description: row.description.clone(),
                })
            })
            .collect())
    }

    /// Look up a dataset by id; `None` for unknown ids.
    pub fn get(&self, dataset_id: &str) -> Option<&Dataset> {
        self.datasets.get(dataset_id)
    }

    /// All datasets keyed by id.
    pub fn datasets(&self) -> &BTreeMap<String, Dataset> {
        &self.datasets
    }

    /// Iterate over `(id, dataset)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|(id, dataset)| (id.as_str(), dataset))
    }

    /// Number of datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Returns `true` if no dataset was loaded.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Counts from the run.
    pub fn report(&self) -> DiscoveryReport {
        self.report
    }

    /// Progress handle of the run.
    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Dataset-level index.
    pub fn dataset_index(&self) -> &Arc<dyn TextIndex> {
        &self.dataset_index
    }

    /// Variable-level index shared by every dataset.
    pub fn variable_index(&self) -> &Arc<dyn TextIndex> {
        &self.variable_index
    }
}

impl<'a> IntoIterator for &'a Discovery {
    type Item = (&'a String, &'a Dataset);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}

impl fmt::Debug for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("datasets", &self.datasets.keys().collect::<Vec<_>>())
            .field("report", &self.report)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
