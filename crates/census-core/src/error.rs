//! Error types shared by every Census crate.
//!
//! The variants follow the failure classes of discovery:
//!
//! - structural failures (`Catalog`) abort a whole discovery run,
//! - per-dataset failures (`Metadata`, and fetch errors raised while loading
//!   one dataset) are logged and skipped by the orchestrator,
//! - index misuse (`Session`, `InvalidQuery`) fails loudly at the call site,
//! - remote failures (`Http`, `Transport`, `Json`, `MalformedResponse`) are
//!   propagated to whoever issued the request.

use std::path::{Path, PathBuf};

/// Errors that can occur while discovering, indexing, or querying datasets.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The root catalog could not be fetched or has no dataset list.
    #[error("Catalog error: {message}")]
    Catalog {
        /// What is wrong with the catalog
        message: String,
        /// Underlying failure, if any
        #[source]
        source: Option<Box<Error>>,
    },

    /// One dataset's metadata is missing or unusable.
    #[error("Metadata error for dataset '{dataset}': {message}")]
    Metadata {
        /// Dataset id or title
        dataset: String,
        /// What went wrong
        message: String,
    },

    /// A text index was written or queried outside its write-session rules.
    #[error("Index session error: {0}")]
    Session(String),

    /// A query string or field constraint could not be interpreted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The index backend failed internally.
    #[error("Index error: {0}")]
    Index(String),

    /// The server answered with a failing HTTP status.
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// The request never produced a response (connect, timeout, body read).
    #[error("Transport error fetching {url}: {message}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport failure description
        message: String,
    },

    /// The response body was not valid JSON.
    #[error("Invalid JSON from {url}: {source}")]
    Json {
        /// Requested URL
        url: String,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// A data query response was valid JSON but not a header-plus-rows table.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// I/O error tied to a path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Parse error for local data (config files, cached documents).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience `Result` type alias for Census operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether retrying the same request may succeed.
    ///
    /// Transport failures, throttling (429) and server-side statuses (5xx)
    /// are transient. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::Http { status, .. } => *status == 429 || *status >= 500,
            Error::Catalog { .. }
            | Error::Metadata { .. }
            | Error::Session(_)
            | Error::InvalidQuery(_)
            | Error::Index(_)
            | Error::Json { .. }
            | Error::MalformedResponse(_)
            | Error::Config { .. }
            | Error::Io { .. }
            | Error::Parse(_) => false,
        }
    }

    /// Returns whether this is an HTTP status failure.
    pub fn is_http(&self) -> bool {
        matches!(self, Error::Http { .. })
    }

    /// Creates a structural catalog error.
    pub fn catalog<S: Into<String>>(message: S) -> Self {
        Error::Catalog {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a structural catalog error caused by another error.
    pub fn catalog_with_source<S: Into<String>>(message: S, source: Error) -> Self {
        Error::Catalog {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a per-dataset metadata error.
    pub fn metadata<D, M>(dataset: D, message: M) -> Self
    where
        D: Into<String>,
        M: Into<String>,
    {
        Error::Metadata {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    /// Creates an index session error.
    pub fn session<S: Into<String>>(message: S) -> Self {
        Error::Session(message.into())
    }

    /// Creates an invalid query error.
    pub fn invalid_query<S: Into<String>>(message: S) -> Self {
        Error::InvalidQuery(message.into())
    }

    /// Creates an index backend error.
    pub fn index<S: Into<String>>(message: S) -> Self {
        Error::Index(message.into())
    }

    /// Creates a malformed response error.
    pub fn malformed_response<S: Into<String>>(message: S) -> Self {
        Error::MalformedResponse(message.into())
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Error::Parse(message.into())
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Http {
            url: "https://api.census.gov/data.json".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 fetching https://api.census.gov/data.json"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let transport = Error::Transport {
            url: "u".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(transport.is_retryable());
        assert!(Error::Http { url: "u".into(), status: 503 }.is_retryable());
        assert!(Error::Http { url: "u".into(), status: 429 }.is_retryable());
        assert!(!Error::Http { url: "u".into(), status: 404 }.is_retryable());
        assert!(!Error::session("closed").is_retryable());
        assert!(!Error::catalog("no datasets").is_retryable());
    }

    #[test]
    fn test_metadata_error() {
        let err = Error::metadata("acs/acs5", "no API distribution");
        let Error::Metadata { dataset, message } = err else {
            unreachable!("Expected Metadata error variant");
        };
        assert_eq!(dataset, "acs/acs5");
        assert_eq!(message, "no API distribution");
    }

    #[test]
    fn test_catalog_error_with_source() {
        let cause = Error::Http {
            url: "https://api.census.gov/data.json".into(),
            status: 500,
        };
        let err = Error::catalog_with_source("unable to fetch catalog", cause);
        assert!(err.to_string().contains("unable to fetch catalog"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_error_not_retryable() {
        let source = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err = Error::Json {
            url: "u".to_string(),
            source,
        };
        assert!(err.to_string().contains("Invalid JSON"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_with_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::io_with_path(io, "/tmp/census.toml");
        assert!(err.to_string().contains("/tmp/census.toml"));
    }

    #[test]
    fn test_error_implements_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
