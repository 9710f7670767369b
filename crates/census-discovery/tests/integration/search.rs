//! Integration tests for dataset and variable search.

use census_core::{IndexBackend, IndexConfig};
use census_discovery::Discovery;
use census_fts::{FieldConstraint, SearchOptions};

use crate::common::{MockFetcher, fixture_fetcher};

async fn discover(backend: IndexBackend) -> Discovery {
    Discovery::builder("key", fixture_fetcher(MockFetcher::new()))
        .index_config(IndexConfig::in_memory(backend))
        .build()
        .await
        .expect("Discovery should succeed")
}

fn backends() -> Vec<IndexBackend> {
    if cfg!(feature = "fts-tantivy") {
        vec![IndexBackend::Memory, IndexBackend::Tantivy]
    } else {
        vec![IndexBackend::Memory]
    }
}

#[tokio::test]
async fn test_unqualified_search_uses_titles() {
    for backend in backends() {
        let discovery = discover(backend).await;

        // "Population" appears in the poverty description but only in the
        // title of the population estimates.
        let found = discovery.search("population").unwrap();
        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].dataset_id, "2019/pep/population");
        assert_eq!(found[0].title, "Vintage 2019 Population Estimates");

        let found = discovery.search("description:population").unwrap();
        let mut ids: Vec<_> = found.iter().map(|m| m.dataset_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["2019/pep/population", "timeseries/poverty/histpov2"], "{backend}");
    }
}

#[tokio::test]
async fn test_keyword_search() {
    for backend in backends() {
        let discovery = discover(backend).await;

        let found = discovery.search("keywords:income").unwrap();
        assert_eq!(found.len(), 2, "{backend}");
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));

        let found = discovery.search("keywords:income AND keywords:housing").unwrap();
        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].dataset_id, "2019/acs/acs5");
    }
}

#[tokio::test]
async fn test_search_over_variable_labels() {
    for backend in backends() {
        let discovery = discover(backend).await;
        let found = discovery.search("variables:housing").unwrap();
        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].dataset_id, "2019/acs/acs5");
    }
}

#[tokio::test]
async fn test_search_limit() {
    let discovery = discover(IndexBackend::Memory).await;
    let found = discovery.search_with("", &SearchOptions::with_limit(2)).unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_search_variables_scoped_to_dataset() {
    for backend in backends() {
        let discovery = discover(backend).await;
        let pep = discovery.get("2019/pep/population").unwrap();

        let mut found: Vec<_> = pep
            .search_variables("population", &[])
            .unwrap()
            .into_iter()
            .map(|m| m.variable)
            .collect();
        found.sort_unstable();
        assert_eq!(found, vec!["DENSITY", "POP"], "{backend}");

        // NAME exists in two datasets; only this dataset's row is returned
        let acs = discovery.get("2019/acs/acs5").unwrap();
        let names = acs.search_variables("geographic", &[]).unwrap();
        assert_eq!(names.len(), 1, "{backend}");
        assert_eq!(names[0].variable, "NAME");
    }
}

#[tokio::test]
async fn test_search_variables_with_constraint() {
    let discovery = discover(IndexBackend::Memory).await;
    let acs = discovery.get("2019/acs/acs5").unwrap();

    let grouped = acs
        .search_variables("", &[FieldConstraint::exact("group", "B25001")])
        .unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].variable, "B25001_001E");
    assert_eq!(grouped[0].concept, "Housing Units");
}
