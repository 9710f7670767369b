//! Discovery lifecycle and progress tracking.
//!
//! A [`ProgressHandle`] is shared between the discovery run and anyone who
//! wants to observe it. Phase changes are broadcast over a watch channel;
//! dataset counters are plain atomics.
//!
//! ```rust
//! use census_discovery::progress::{DiscoveryPhase, ProgressHandle};
//!
//! let handle = ProgressHandle::new("census");
//! assert_eq!(handle.phase(), DiscoveryPhase::Uninitialized);
//!
//! handle.set_phase(DiscoveryPhase::FetchingCatalog);
//! handle.record_loaded();
//! assert_eq!(handle.processed(), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Processed-dataset interval between progress log lines.
pub const PROGRESS_LOG_INTERVAL: usize = 100;

// ============================================================================
// DiscoveryPhase
// ============================================================================

/// Phase of a discovery run.
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryPhase {
    /// Nothing has started.
    Uninitialized,
    /// Fetching the root catalog.
    FetchingCatalog,
    /// Loading per-dataset metadata and indexing variables.
    ProcessingDatasets,
    /// Variable index committed; dataset index being built.
    Indexed,
    /// Both indexes committed and queryable.
    Ready,
    /// A structural failure ended the run.
    Failed(String),
}

impl DiscoveryPhase {
    /// Returns `true` once discovery is queryable.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if the run has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::FetchingCatalog => write!(f, "fetching catalog"),
            Self::ProcessingDatasets => write!(f, "processing datasets"),
            Self::Indexed => write!(f, "indexed"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ============================================================================
// ProgressHandle
// ============================================================================

/// Thread-safe handle for observing and updating discovery progress.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

struct ProgressInner {
    name: String,
    tx: watch::Sender<DiscoveryPhase>,
    processed: AtomicUsize,
    failed: AtomicUsize,
    started_at: Instant,
}

impl ProgressHandle {
    /// Create a handle in the [`DiscoveryPhase::Uninitialized`] phase.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(DiscoveryPhase::Uninitialized);
        Self {
            inner: Arc::new(ProgressInner {
                name: name.into(),
                tx,
                processed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    /// Get the run name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the current phase.
    pub fn phase(&self) -> DiscoveryPhase {
        self.inner.tx.borrow().clone()
    }

    /// Move to a new phase, notifying subscribers.
    pub fn set_phase(&self, phase: DiscoveryPhase) {
        log::info!("Discovery '{}' -> {phase}", self.inner.name);
        self.inner.tx.send_replace(phase);
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<DiscoveryPhase> {
        self.inner.tx.subscribe()
    }

    /// Count a successfully loaded dataset.
    pub fn record_loaded(&self) {
        self.bump_processed();
    }

    /// Count a dataset skipped because of a per-dataset failure.
    pub fn record_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
        self.bump_processed();
    }

    fn bump_processed(&self) {
        let processed = self.inner.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % PROGRESS_LOG_INTERVAL == 0 {
            log::info!(
                "Discovery '{}': processed {processed} datasets ({} failed)",
                self.inner.name,
                self.failed()
            );
        }
    }

    /// Datasets processed so far, loaded or failed.
    ///
    /// Counts accumulate across every run sharing this handle.
    pub fn processed(&self) -> usize {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// Datasets skipped so far.
    pub fn failed(&self) -> usize {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Wait until the run is ready, has failed, or the timeout passes.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), String> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let phase = rx.borrow_and_update().clone();
            match phase {
                DiscoveryPhase::Ready => return Ok(()),
                DiscoveryPhase::Failed(reason) => {
                    return Err(format!("Discovery '{}' failed: {reason}", self.inner.name));
                }
                _ => {}
            }

            tokio::select! {
                _ = &mut deadline => {
                    return Err(format!(
                        "Discovery '{}' not ready after {timeout:?} (phase: {})",
                        self.inner.name, self.phase()
                    ));
                }
                result = rx.changed() => {
                    if result.is_err() {
                        return Err(format!("Discovery '{}' channel closed", self.inner.name));
                    }
                }
            }
        }
    }

    /// Elapsed time since the handle was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

impl fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("name", &self.inner.name)
            .field("phase", &self.phase())
            .field("processed", &self.processed())
            .field("failed", &self.failed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
