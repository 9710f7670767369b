//! Handlers for the discovery-backed commands.
//!
//! Every command runs a full discovery pass first, then answers from the
//! resulting indexes or the chosen dataset.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use census_core::{CachingFetcher, CensusConfig, HttpFetcher};
use census_discovery::{DataQuery, DatasetMatch, Discovery, Table, VariableMatch};
use census_fts::{FieldConstraint, SearchOptions};

use crate::cli::Command;

/// Run a discovery pass with the configured fetcher and indexes.
pub async fn discover(config: &CensusConfig) -> Result<Discovery> {
    let http = HttpFetcher::new(&config.http)?;
    let fetcher = Arc::new(CachingFetcher::new(http, config.http.cache_ttl()));

    let discovery = Discovery::from_config(config, fetcher.clone())
        .build()
        .await
        .context("Discovery failed")?;

    let stats = fetcher.stats();
    tracing::debug!(hits = stats.hits, misses = stats.misses, "Metadata cache");
    tracing::info!("{}", discovery.report());
    Ok(discovery)
}

/// Dispatch a discovery-backed command.
pub async fn run(config: &CensusConfig, command: Command) -> Result<()> {
    let mut out = std::io::stdout();
    match command {
        Command::Search { query, limit } => {
            let discovery = discover(config).await?;
            let found = discovery.search_with(&query.join(" "), &SearchOptions::with_limit(limit))?;
            write_datasets(&mut out, &found)?;
        }
        Command::Variables {
            dataset,
            query,
            group,
            limit,
        } => {
            let discovery = discover(config).await?;
            let dataset = lookup(&discovery, &dataset)?;
            let constraints: Vec<FieldConstraint> = group
                .into_iter()
                .map(|g| FieldConstraint::exact("group", g))
                .collect();
            let mut found = dataset.search_variables(&query.join(" "), &constraints)?;
            found.truncate(limit);
            write_variables(&mut out, &found)?;
        }
        Command::Query {
            dataset,
            fields,
            for_geo,
            in_geo,
            group,
        } => {
            let discovery = discover(config).await?;
            let dataset = lookup(&discovery, &dataset)?;
            let query = build_query(fields, for_geo, in_geo, group);
            let table = dataset.query(&query).await?;
            write_table(&mut out, &table)?;
        }
        Command::Config { .. } => bail!("config commands do not need discovery"),
    }
    Ok(())
}

fn lookup<'d>(discovery: &'d Discovery, id: &str) -> Result<&'d census_discovery::Dataset> {
    match discovery.get(id) {
        Some(dataset) => Ok(dataset),
        None => bail!("Unknown dataset id '{id}'; try `census search` to find one"),
    }
}

/// Assemble a data query from command-line parts.
pub fn build_query(
    fields: Vec<String>,
    for_geo: Vec<(String, String)>,
    in_geo: Vec<(String, String)>,
    groups: Vec<String>,
) -> DataQuery {
    let mut query = DataQuery::new().fields(fields);
    for (level, selector) in for_geo {
        query = query.for_geo(level, selector);
    }
    for (level, selector) in in_geo {
        query = query.in_geo(level, selector);
    }
    for group in groups {
        query = query.group(group);
    }
    query
}

// ============================================================================
// Output
// ============================================================================

/// Print dataset matches, best first.
pub fn write_datasets(out: &mut impl Write, found: &[DatasetMatch]) -> std::io::Result<()> {
    if found.is_empty() {
        writeln!(out, "No matching datasets")?;
        return Ok(());
    }
    for m in found {
        writeln!(out, "{:>8.3}  {:<40}  {}", m.score, m.dataset_id, m.title)?;
    }
    Ok(())
}

/// Print variable matches, best first.
pub fn write_variables(out: &mut impl Write, found: &[VariableMatch]) -> std::io::Result<()> {
    if found.is_empty() {
        writeln!(out, "No matching variables")?;
        return Ok(());
    }
    for m in found {
        writeln!(out, "{:>8.3}  {:<20}  {}", m.score, m.variable, m.label)?;
    }
    Ok(())
}

/// Print a result table as tab-separated values.
pub fn write_table(out: &mut impl Write, table: &Table) -> std::io::Result<()> {
    write!(out, "{table}")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_datasets() {
        let mut out = Vec::new();
        write_datasets(
            &mut out,
            &[DatasetMatch {
                score: 1.5,
                dataset_id: "2019/acs/acs5".to_string(),
                title: "American Community Survey".to_string(),
                description: String::new(),
            }],
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("   1.500  2019/acs/acs5"));
        assert!(text.trim_end().ends_with("American Community Survey"));
    }

    #[test]
    fn test_write_empty_results() {
        let mut out = Vec::new();
        write_datasets(&mut out, &[]).unwrap();
        write_variables(&mut out, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "No matching datasets\nNo matching variables\n"
        );
    }

    #[test]
    fn test_write_variables() {
        let mut out = Vec::new();
        write_variables(
            &mut out,
            &[VariableMatch {
                score: 0.25,
                variable: "B01001_001E".to_string(),
                group: "B01001".to_string(),
                label: "Estimate!!Total".to_string(),
                concept: "SEX BY AGE".to_string(),
            }],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("B01001_001E"));
        assert!(text.contains("Estimate!!Total"));
    }

    #[test]
    fn test_build_query() {
        let query = build_query(
            vec!["NAME".to_string(), "POP".to_string()],
            vec![("county".to_string(), "*".to_string())],
            vec![("state".to_string(), "06".to_string())],
            vec!["B01001".to_string()],
        );
        let params = query.params("");
        assert_eq!(
            params,
            vec![
                ("get".to_string(), "NAME,POP,group(B01001)".to_string()),
                ("for".to_string(), "county:*".to_string()),
                ("in".to_string(), "state:06".to_string()),
            ]
        );
    }

    #[test]
    fn test_write_table() {
        let table = Table::from_response(&serde_json::json!([["NAME"], ["Ohio"]])).unwrap();
        let mut out = Vec::new();
        write_table(&mut out, &table).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "NAME\nOhio\n");
    }
}
