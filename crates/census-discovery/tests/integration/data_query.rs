//! Integration tests for data queries against a discovered dataset.

use census_core::{Error, IndexBackend, IndexConfig};
use census_discovery::{ColumnValues, DataQuery, Discovery};
use serde_json::json;

use crate::common::{MockFetcher, fixture_datasets, fixture_fetcher};

#[tokio::test]
async fn test_numeric_coercion_end_to_end() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let pep = &fixtures[0];
    mock.insert(
        pep.endpoint(),
        json!([
            ["NAME", "POP", "DENSITY", "state"],
            ["Alabama", "100", "37.5", "01"],
            ["Alaska", "200", "1.3", "02"]
        ]),
    );
    let fetcher = fixture_fetcher(mock);

    let discovery = Discovery::builder("secret", fetcher.clone())
        .index_config(IndexConfig::in_memory(IndexBackend::Memory))
        .build()
        .await
        .unwrap();
    let dataset = discovery.get("2019/pep/population").unwrap();

    let table = dataset
        .query(
            &DataQuery::new()
                .fields(["NAME", "POP", "DENSITY"])
                .for_geo("state", "*"),
        )
        .await
        .expect("Query should succeed");

    assert_eq!(table.num_rows(), 2);
    assert_eq!(
        table.column("POP").unwrap().values,
        ColumnValues::Numeric(vec![Some(100.0), Some(200.0)])
    );
    assert_eq!(
        table.column("DENSITY").unwrap().values,
        ColumnValues::Numeric(vec![Some(37.5), Some(1.3)])
    );
    // Strings and fips selectors stay text
    assert!(table.column("NAME").unwrap().values.as_text().is_some());
    assert!(table.column("state").unwrap().values.as_text().is_some());

    let (url, params) = fetcher
        .requests()
        .into_iter()
        .rev()
        .find(|(url, _)| *url == pep.endpoint())
        .unwrap();
    assert_eq!(url, pep.endpoint());
    assert!(params.contains(&("get".to_string(), "NAME,POP,DENSITY".to_string())));
    assert!(params.contains(&("for".to_string(), "state:*".to_string())));
    assert!(params.contains(&("key".to_string(), "secret".to_string())));
}

#[tokio::test]
async fn test_rejected_query_propagates() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let pep = &fixtures[0];
    mock.fail(pep.endpoint(), 400);
    let fetcher = fixture_fetcher(mock);

    let discovery = Discovery::builder("key", fetcher)
        .index_config(IndexConfig::in_memory(IndexBackend::Memory))
        .build()
        .await
        .unwrap();

    let err = discovery
        .get("2019/pep/population")
        .unwrap()
        .query(&DataQuery::new().fields(["POP"]).for_geo("county", "*"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { status: 400, .. }));
}

#[tokio::test]
async fn test_malformed_response() {
    let mock = MockFetcher::new();
    let fixtures = fixture_datasets();
    let pep = &fixtures[0];
    mock.insert(pep.endpoint(), json!({"error": "unknown variable 'NOPE'"}));
    let fetcher = fixture_fetcher(mock);

    let discovery = Discovery::builder("key", fetcher)
        .index_config(IndexConfig::in_memory(IndexBackend::Memory))
        .build()
        .await
        .unwrap();

    let err = discovery
        .get("2019/pep/population")
        .unwrap()
        .query(&DataQuery::new().fields(["NOPE"]).for_geo("us", "*"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}
