//! Integration tests for complete discovery runs.

use std::sync::Arc;
use std::time::Duration;

use census_core::{Error, IndexBackend, IndexConfig, JsonFetcher};
use census_discovery::{Discovery, DiscoveryPhase, ProgressHandle, Scheduling};
use census_fts::SearchOptions;
use serde_json::json;

use crate::common::{BASE, MockFetcher, fixture_datasets, fixture_fetcher};

fn memory() -> IndexConfig {
    IndexConfig::in_memory(IndexBackend::Memory)
}

#[tokio::test]
async fn test_discovery_loads_every_dataset() {
    let fetcher = fixture_fetcher(MockFetcher::new());
    let progress = ProgressHandle::new("test");

    let discovery = Discovery::builder("key", fetcher)
        .index_config(memory())
        .progress(progress.clone())
        .build()
        .await
        .expect("Discovery should succeed");

    assert_eq!(discovery.len(), 3);
    let report = discovery.report();
    assert_eq!(report.catalog_entries, 3);
    assert_eq!(report.datasets_loaded, 3);
    assert_eq!(report.datasets_failed, 0);
    assert_eq!(report.variables_indexed, 8);

    assert_eq!(progress.phase(), DiscoveryPhase::Ready);
    assert_eq!(progress.processed(), 3);
    assert!(discovery.dataset_index().is_ready());
    assert!(discovery.variable_index().is_ready());
}

#[tokio::test]
async fn test_partial_failure_isolated() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let poverty = &fixtures[1];
    mock.fail(poverty.link("geography"), 404);
    let fetcher = fixture_fetcher(mock);
    let progress = ProgressHandle::new("partial");

    let discovery = Discovery::builder("key", fetcher)
        .index_config(memory())
        .progress(progress.clone())
        .build()
        .await
        .expect("Per-dataset failures must not fail discovery");

    assert_eq!(discovery.len(), 2);
    assert!(discovery.get("timeseries/poverty/histpov2").is_none());
    assert!(discovery.get("2019/pep/population").is_some());

    let report = discovery.report();
    assert_eq!(report.datasets_loaded, 2);
    assert_eq!(report.datasets_failed, 1);
    assert_eq!(progress.failed(), 1);
    assert_eq!(progress.phase(), DiscoveryPhase::Ready);

    // The failed dataset contributes no rows to either index
    assert_eq!(report.variables_indexed, 6);
    assert!(discovery.search("poverty").unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_tags_tolerated() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let acs = &fixtures[2];
    mock.fail(acs.link("tags"), 500);
    let fetcher = fixture_fetcher(mock);

    let discovery = Discovery::builder("key", fetcher)
        .index_config(memory())
        .build()
        .await
        .unwrap();

    let dataset = discovery.get("2019/acs/acs5").expect("ACS should load");
    assert!(dataset.tags().is_empty());
    assert_eq!(
        discovery.get("2019/pep/population").unwrap().tags(),
        ["demographics"]
    );
}

#[tokio::test]
async fn test_unknown_id_is_absent() {
    let discovery = Discovery::builder("key", fixture_fetcher(MockFetcher::new()))
        .index_config(memory())
        .build()
        .await
        .unwrap();

    assert!(discovery.get("nonexistent").is_none());
}

#[tokio::test]
async fn test_unreachable_catalog_is_fatal() {
    let fetcher = Arc::new(MockFetcher::new());
    let progress = ProgressHandle::new("no-catalog");

    let err = Discovery::builder("key", fetcher)
        .index_config(memory())
        .progress(progress.clone())
        .build()
        .await
        .err()
        .expect("Missing catalog must fail");

    assert!(matches!(err, Error::Catalog { .. }));
    assert!(matches!(progress.phase(), DiscoveryPhase::Failed(_)));
}

#[tokio::test]
async fn test_catalog_without_datasets_is_fatal() {
    let mock = MockFetcher::new();
    mock.insert(format!("{BASE}.json"), json!({"dataset": []}));

    let err = Discovery::builder("key", Arc::new(mock))
        .index_config(memory())
        .build()
        .await
        .err()
        .expect("Empty catalog must fail");

    assert!(err.to_string().contains("Unable to identify datasets"));
}

#[tokio::test]
async fn test_vintage_scoped_catalog() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let pep = &fixtures[0];
    pep.register(&mock);
    mock.insert(format!("{BASE}/2019.json"), json!({"dataset": [pep.catalog_entry()]}));
    let fetcher = Arc::new(mock);

    let discovery = Discovery::builder("key", fetcher.clone())
        .vintage("2019")
        .index_config(memory())
        .build()
        .await
        .unwrap();

    assert_eq!(discovery.len(), 1);
    assert_eq!(fetcher.request_count(&format!("{BASE}/2019.json")), 1);
    assert_eq!(fetcher.request_count(&format!("{BASE}.json")), 0);
}

#[tokio::test]
async fn test_sequential_and_concurrent_agree() {
    let mut ids = Vec::new();
    for scheduling in [Scheduling::Sequential, Scheduling::Concurrent { limit: 3 }] {
        let fetcher = fixture_fetcher(MockFetcher::with_delay(Duration::from_millis(5)));
        let discovery = Discovery::builder("key", fetcher)
            .scheduling(scheduling)
            .index_config(memory())
            .build()
            .await
            .unwrap();

        assert_eq!(discovery.report().variables_indexed, 8);
        ids.push(discovery.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>());
    }
    assert_eq!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_concurrent_loads_overlap() {
    let fetcher = fixture_fetcher(MockFetcher::with_delay(Duration::from_millis(20)));
    let discovery = Discovery::builder("key", fetcher.clone())
        .scheduling(Scheduling::Concurrent { limit: 3 })
        .index_config(memory())
        .build()
        .await
        .unwrap();

    let overlap = fetcher.max_in_flight();
    assert!(overlap > 1, "expected overlapping loads, saw {overlap}");
    assert!(overlap <= 3, "limit exceeded: {overlap}");

    // Every dataset's rows survived the shared write session
    assert_eq!(discovery.report().variables_indexed, 8);
    let all = discovery
        .variable_index()
        .query("", &[], &SearchOptions::default())
        .unwrap();
    assert_eq!(all.len(), 8);
    let per_dataset: usize = discovery
        .iter()
        .map(|(_, dataset)| dataset.search_variables("", &[]).unwrap().len())
        .sum();
    assert_eq!(per_dataset, 8);
}

#[tokio::test]
async fn test_sequential_loads_one_at_a_time() {
    let fetcher = fixture_fetcher(MockFetcher::with_delay(Duration::from_millis(5)));
    Discovery::builder("key", fetcher.clone())
        .scheduling(Scheduling::Sequential)
        .index_config(memory())
        .build()
        .await
        .unwrap();

    assert_eq!(fetcher.max_in_flight(), 1);
}

#[tokio::test]
async fn test_reused_progress_handle_reports_each_run() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    mock.fail(fixtures[1].link("geography"), 404);
    let fetcher = fixture_fetcher(mock);
    let progress = ProgressHandle::new("refresh");

    for _ in 0..2 {
        let discovery = Discovery::builder("key", fetcher.clone())
            .index_config(memory())
            .progress(progress.clone())
            .build()
            .await
            .unwrap();

        let report = discovery.report();
        assert_eq!(report.catalog_entries, 3);
        assert_eq!(report.datasets_loaded, 2);
        assert_eq!(report.datasets_failed, 1);
    }

    // The handle itself keeps running totals
    assert_eq!(progress.failed(), 2);
    assert_eq!(progress.processed(), 6);
}

#[tokio::test]
async fn test_duplicate_ids_keep_later_catalog_entry() {
    let mock = MockFetcher::with_delay(Duration::from_millis(5));
    let fixtures = fixture_datasets();
    let pep = &fixtures[0];
    pep.register(&mock);

    let revised_variables = pep.link("variables-revised");
    mock.insert(
        revised_variables.clone(),
        json!({"variables": {
            "POP": {"label": "Revised Total Population", "concept": "Population", "predicateType": "int"}
        }}),
    );
    let mut revised = pep.catalog_entry();
    revised["title"] = json!("Revised Population Estimates");
    revised["c_variablesLink"] = json!(revised_variables);
    mock.insert(
        format!("{BASE}.json"),
        json!({"dataset": [pep.catalog_entry(), revised]}),
    );
    let fetcher = Arc::new(mock);

    for scheduling in [Scheduling::Sequential, Scheduling::Concurrent { limit: 2 }] {
        let discovery = Discovery::builder("key", fetcher.clone())
            .scheduling(scheduling)
            .index_config(memory())
            .build()
            .await
            .unwrap();

        assert_eq!(discovery.len(), 1);
        let dataset = discovery.get("2019/pep/population").unwrap();
        assert_eq!(dataset.title(), "Revised Population Estimates");

        let report = discovery.report();
        assert_eq!(report.catalog_entries, 2);
        assert_eq!(report.datasets_loaded, 1);
        assert_eq!(report.variables_indexed, 1);
        assert_eq!(dataset.search_variables("", &[]).unwrap().len(), 1);
    }

    // The earlier entry was never loaded
    assert_eq!(fetcher.request_count(&pep.link("variables")), 0);
}

#[tokio::test]
async fn test_from_config() {
    let mut config = census_core::CensusConfig::default();
    config.api_key = "from-config".to_string();
    config.discovery.scheduling = census_core::SchedulingMode::Sequential;
    config.index = memory();

    let fetcher = fixture_fetcher(MockFetcher::new());
    let shared: Arc<dyn JsonFetcher> = fetcher.clone();
    let discovery = Discovery::from_config(&config, shared).build().await.unwrap();
    assert_eq!(discovery.len(), 3);
}

#[tokio::test]
async fn test_debug_lists_ids() {
    let discovery = Discovery::builder("key", fixture_fetcher(MockFetcher::new()))
        .index_config(memory())
        .build()
        .await
        .unwrap();

    let debug = format!("{discovery:?}");
    assert!(debug.contains("2019/acs/acs5"));
    assert!(debug.contains("timeseries/poverty/histpov2"));
}

#[cfg(feature = "fts-tantivy")]
#[tokio::test]
async fn test_persistent_tantivy_indexes() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = IndexConfig {
        backend: IndexBackend::Tantivy,
        path: Some(dir.path().to_path_buf()),
    };

    let discovery = Discovery::builder("key", fixture_fetcher(MockFetcher::new()))
        .index_config(config)
        .build()
        .await
        .unwrap();

    assert_eq!(discovery.len(), 3);
    assert!(dir.path().join("datasets").join("meta.json").exists());
    assert!(dir.path().join("variables").join("meta.json").exists());
    assert_eq!(discovery.search("population").unwrap().len(), 1);
}
