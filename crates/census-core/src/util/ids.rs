//! Dataset identifier and catalog URL utilities.
//!
//! A dataset id is its API endpoint with the shared API base removed, e.g.
//! `https://api.census.gov/data/2019/acs/acs5` → `2019/acs/acs5`. The live
//! catalog has published endpoints under both `http://` and `https://`, so
//! the comparison ignores the scheme; ids are therefore stable across the
//! two forms.

/// Default base URL of the Census data API.
pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// Strip an `http://` or `https://` scheme prefix.
fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Derive the canonical dataset id from its API endpoint.
///
/// # Examples
///
/// ```
/// use census_core::util::ids::dataset_id_from_endpoint;
///
/// let base = "https://api.census.gov/data";
/// assert_eq!(
///     dataset_id_from_endpoint("http://api.census.gov/data/2019/acs/acs5", base),
///     "2019/acs/acs5"
/// );
/// assert_eq!(
///     dataset_id_from_endpoint("https://api.census.gov/data/timeseries/poverty/histpov2", base),
///     "timeseries/poverty/histpov2"
/// );
/// ```
pub fn dataset_id_from_endpoint(endpoint: &str, base_url: &str) -> String {
    let endpoint = strip_scheme(endpoint.trim()).trim_end_matches('/');
    let base = strip_scheme(base_url.trim()).trim_end_matches('/');

    match endpoint.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => endpoint.to_string(),
    }
}

/// Build the catalog URL, optionally scoped to one vintage.
///
/// # Examples
///
/// ```
/// use census_core::util::ids::catalog_url;
///
/// assert_eq!(catalog_url("https://api.census.gov/data", None), "https://api.census.gov/data.json");
/// assert_eq!(
///     catalog_url("https://api.census.gov/data/", Some("2019")),
///     "https://api.census.gov/data/2019.json"
/// );
/// ```
pub fn catalog_url(base_url: &str, vintage: Option<&str>) -> String {
    let base = base_url.trim().trim_end_matches('/');
    match vintage.map(str::trim).filter(|v| !v.is_empty()) {
        Some(vintage) => format!("{base}/{vintage}.json"),
        None => format!("{base}.json"),
    }
}
