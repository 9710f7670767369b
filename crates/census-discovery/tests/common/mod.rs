//! Common test utilities and harness for discovery integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use census_core::{Error, JsonFetcher, Result};
use serde_json::{Value, json};

pub const BASE: &str = "https://api.census.gov/data";

/// Fetcher answering from canned documents.
///
/// Unknown URLs answer 404; URLs registered with [`MockFetcher::fail`]
/// answer the given status.
#[derive(Default)]
pub struct MockFetcher {
    documents: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, u16>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every answer, so concurrent loads interleave.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn insert(&self, url: impl Into<String>, document: Value) {
        self.documents.lock().unwrap().insert(url.into(), document);
    }

    pub fn fail(&self, url: impl Into<String>, status: u16) {
        self.failures.lock().unwrap().insert(url.into(), status);
    }

    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of fetches seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }
}

#[async_trait]
impl JsonFetcher for MockFetcher {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), params.to_vec()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.failures.lock().unwrap().get(url) {
            return Err(Error::Http {
                url: url.to_string(),
                status: *status,
            });
        }
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(Error::Http {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Description of one fixture dataset.
pub struct FixtureDataset {
    pub path: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
    pub variables: Value,
    pub with_tags: bool,
}

impl FixtureDataset {
    pub fn endpoint(&self) -> String {
        format!("{BASE}/{}", self.path)
    }

    pub fn link(&self, document: &str) -> String {
        format!("{}/{document}.json", self.endpoint())
    }

    pub fn catalog_entry(&self) -> Value {
        let mut entry = json!({
            "title": self.title,
            "description": self.description,
            "c_dataset": self.path.split('/').collect::<Vec<_>>(),
            "keyword": self.keywords,
            "distribution": [
                {"format": "API", "accessURL": self.endpoint()},
                {"format": "CSV", "accessURL": format!("https://www2.census.gov/{}.csv", self.path)}
            ],
            "c_geographyLink": self.link("geography"),
            "c_variablesLink": self.link("variables"),
        });
        if self.with_tags {
            entry["c_tagsLink"] = json!(self.link("tags"));
        }
        entry
    }

    /// Register this dataset's metadata documents with `fetcher`.
    pub fn register(&self, fetcher: &MockFetcher) {
        fetcher.insert(
            self.link("geography"),
            json!({"fips": [
                {"name": "us", "geoLevelDisplay": "010"},
                {"name": "state", "geoLevelDisplay": "040"},
                {"name": "county", "geoLevelDisplay": "050", "requires": ["state"], "wildcard": ["state"]}
            ]}),
        );
        fetcher.insert(self.link("variables"), json!({"variables": self.variables}));
        if self.with_tags {
            fetcher.insert(self.link("tags"), json!({"tags": ["demographics"]}));
        }
    }
}

/// Three datasets: population estimates, poverty, and housing.
pub fn fixture_datasets() -> Vec<FixtureDataset> {
    vec![
        FixtureDataset {
            path: "2019/pep/population",
            title: "Vintage 2019 Population Estimates",
            description: "Annual estimates of the resident population",
            keywords: &["population", "estimates"],
            variables: json!({
                "NAME": {"label": "Geographic Area Name", "predicateType": "string"},
                "POP": {"label": "Total Population", "concept": "Population", "predicateType": "int"},
                "DENSITY": {"label": "Population Density", "concept": "Population", "predicateType": "float"},
                "state": {"label": "State FIPS code", "predicateType": "fips-for", "predicateOnly": true}
            }),
            with_tags: true,
        },
        FixtureDataset {
            path: "timeseries/poverty/histpov2",
            title: "Time Series Poverty Status",
            description: "Historical poverty tables from the Current Population Survey",
            keywords: &["poverty", "income"],
            variables: json!({
                "FEMHHPOV": {"label": "People in Families Below Poverty Level", "concept": "Poverty Statistics", "predicateType": "int"},
                "time": {"label": "ISO-8601 Date/Time value", "predicateType": "datetime"}
            }),
            with_tags: false,
        },
        FixtureDataset {
            path: "2019/acs/acs5",
            title: "American Community Survey 5-Year Estimates",
            description: "Housing and income detail for small areas",
            keywords: &["housing", "income"],
            variables: json!({
                "B25001_001E": {"label": "Estimate!!Total housing units", "concept": "Housing Units", "predicateType": "int", "group": "B25001"},
                "NAME": {"label": "Geographic Area Name", "predicateType": "string"}
            }),
            with_tags: true,
        },
    ]
}

/// A mock fetcher serving the catalog and every fixture dataset.
pub fn fixture_fetcher(fetcher: MockFetcher) -> Arc<MockFetcher> {
    let datasets = fixture_datasets();
    for dataset in &datasets {
        dataset.register(&fetcher);
    }
    let entries: Vec<Value> = datasets.iter().map(FixtureDataset::catalog_entry).collect();
    fetcher.insert(format!("{BASE}.json"), json!({"dataset": entries}));
    Arc::new(fetcher)
}
