//! JSON fetching over HTTP.
//!
//! Discovery never talks to the network directly: everything goes through a
//! [`JsonFetcher`], which turns a URL plus query parameters into parsed JSON
//! or a distinguishable error. Implementations decide on caching and retry
//! policy.
//!
//! # Implementations
//!
//! - [`HttpFetcher`]: `reqwest` client with exponential backoff for
//!   transient failures
//! - [`CachingFetcher`]: in-memory TTL cache wrapped around any fetcher
//!
//! # Example
//!
//! ```rust,ignore
//! use census_core::fetch::{CachingFetcher, HttpConfig, HttpFetcher, JsonFetcher};
//!
//! let config = HttpConfig::default();
//! let fetcher = CachingFetcher::new(HttpFetcher::new(&config)?, config.cache_ttl());
//! let catalog = fetcher.fetch("https://api.census.gov/data.json", &[]).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Source of parsed JSON documents.
///
/// # Errors
///
/// Implementations return [`Error::Http`] for failing statuses,
/// [`Error::Transport`] when no response was obtained, and [`Error::Json`]
/// when the body does not parse.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// Fetch `url` with the given query parameters and parse the body.
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value>;

    /// Get the fetcher name for diagnostics.
    fn name(&self) -> &str;
}

/// Build the full request URL for `url` and `params`.
///
/// Parameters are form-encoded and appended to any query string already on
/// `url`.
pub fn build_url(url: &str, params: &[(String, String)]) -> Result<String> {
    let parsed = reqwest::Url::parse_with_params(url, params)
        .map_err(|e| Error::invalid_query(format!("Invalid URL '{url}': {e}")))?;
    let mut full = parsed.to_string();
    if params.is_empty() && full.ends_with('?') {
        full.pop();
    }
    Ok(full)
}

// ============================================================================
// HttpConfig
// ============================================================================

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Number of attempts for transient failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lifetime of cached responses in seconds (0 disables caching).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_retries() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    86_400
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl HttpConfig {
    /// Cache lifetime, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

// ============================================================================
// HttpFetcher
// ============================================================================

/// `reqwest`-backed fetcher.
///
/// Transport errors, 429 and 5xx responses are retried with exponential
/// backoff up to `retries` attempts; other 4xx statuses fail immediately.
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: usize,
}

impl HttpFetcher {
    /// Create a fetcher from HTTP settings.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retries: config.retries.max(1),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Value> {
        log::debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|source| Error::Json {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        let full_url = build_url(url, params)?;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_factor(3.0)
            .with_max_times(self.retries.saturating_sub(1));

        (|| async { self.fetch_once(&full_url).await })
            .retry(backoff)
            .when(|e: &Error| e.is_retryable())
            .notify(|e: &Error, delay: Duration| {
                log::warn!("Retrying {full_url} in {delay:?}: {e}");
            })
            .await
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("retries", &self.retries)
            .finish()
    }
}

// ============================================================================
// CachingFetcher
// ============================================================================

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Responses served from the cache.
    pub hits: u64,
    /// Responses fetched from the inner fetcher.
    pub misses: u64,
}

struct CacheEntry {
    stored_at: Instant,
    value: Value,
}

/// In-memory response cache around another fetcher.
///
/// Entries are keyed by the full request URL and are refetched once older
/// than the configured TTL. Expired entries are pruned whenever a new
/// response is stored. Failed fetches are never cached. With a `None`
/// TTL every call goes to the inner fetcher.
pub struct CachingFetcher<F> {
    inner: F,
    ttl: Option<Duration>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<F: JsonFetcher> CachingFetcher<F> {
    /// Wrap `inner` with a cache of the given lifetime.
    pub fn new(inner: F, ttl: Option<Duration>) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached response.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Get the wrapped fetcher.
    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: JsonFetcher> JsonFetcher for CachingFetcher<F> {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        let Some(ttl) = self.ttl else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return self.inner.fetch(url, params).await;
        };

        let key = build_url(url, params)?;
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if entry.stored_at.elapsed() < ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Cache hit: {key}");
                    return Ok(entry.value.clone());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache miss: {key}");
        let value = self.inner.fetch(url, params).await?;
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    fn name(&self) -> &str {
        "caching"
    }
}

impl<F> std::fmt::Debug for CachingFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFetcher")
            .field("ttl", &self.ttl)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Fetcher that counts calls and fails URLs containing "broken".
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JsonFetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _params: &[(String, String)]) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(Error::Http {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(json!({ "url": url, "call": n }))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // build_url tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_build_url_without_params() {
        let url = build_url("https://api.census.gov/data.json", &[]).unwrap();
        assert_eq!(url, "https://api.census.gov/data.json");
    }

    #[test]
    fn test_build_url_encodes_params() {
        let url = build_url(
            "https://api.census.gov/data/2019/acs/acs5",
            &params(&[("get", "NAME,B01001_001E"), ("for", "county:*"), ("in", "state:06")]),
        )
        .unwrap();
        assert!(url.starts_with("https://api.census.gov/data/2019/acs/acs5?"));
        assert!(url.contains("get=NAME%2CB01001_001E"));
        assert!(url.contains("for=county%3A*"));
        assert!(url.contains("in=state%3A06"));
    }

    #[test]
    fn test_build_url_invalid() {
        let result = build_url("not a url", &[]);
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    // ------------------------------------------------------------------------
    // HttpConfig tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_http_config_cache_disabled() {
        let config = HttpConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.cache_ttl().is_none());
    }

    #[test]
    fn test_http_fetcher_creation() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        assert_eq!(fetcher.name(), "http");
        assert!(format!("{fetcher:?}").contains("retries"));
    }

    // ------------------------------------------------------------------------
    // CachingFetcher tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_caching_fetcher_hits() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_secs(60)));

        let first = fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();
        let second = fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_caching_fetcher_keys_on_params() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_secs(60)));

        fetcher
            .fetch("https://x.test/q", &params(&[("get", "A")]))
            .await
            .unwrap();
        fetcher
            .fetch("https://x.test/q", &params(&[("get", "B")]))
            .await
            .unwrap();

        assert_eq!(fetcher.stats().misses, 2);
        assert_eq!(fetcher.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_caching_fetcher_expired_entry() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_millis(1)));

        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();

        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_caching_fetcher_prunes_expired_entries() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_millis(20)));

        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();
        fetcher.fetch("https://x.test/b.json", &[]).await.unwrap();
        assert_eq!(fetcher.entries.read().await.len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        fetcher.fetch("https://x.test/c.json", &[]).await.unwrap();

        let entries = fetcher.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("https://x.test/c.json"));
    }

    #[tokio::test]
    async fn test_caching_fetcher_does_not_cache_errors() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_secs(60)));

        assert!(fetcher.fetch("https://x.test/broken.json", &[]).await.is_err());
        assert!(fetcher.fetch("https://x.test/broken.json", &[]).await.is_err());

        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_caching_fetcher_disabled() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), None);

        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();
        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();

        assert_eq!(fetcher.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_caching_fetcher_clear() {
        let fetcher = CachingFetcher::new(CountingFetcher::new(), Some(Duration::from_secs(60)));

        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();
        fetcher.clear().await;
        fetcher.fetch("https://x.test/a.json", &[]).await.unwrap();

        assert_eq!(fetcher.stats().misses, 2);
    }
}
