//! Disk-as-Truth storage engine
//!
//! The engine owns no persistent state: the remote store is truth, and
//! everything in process memory is a TTL-bounded cache. All mutation
//! happens inside the lifetime of a caller's request; there are no
//! background tasks.

pub mod cache;
pub mod lifecycle;
pub mod links;
pub mod read;
pub mod reconcile;
pub mod sidecar;
pub mod write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::remote::RemoteStore;

use cache::IndexCache;

pub use reconcile::{ReconcileDepth, ReconcileReport};
pub use write::{UploadFile, UploadOutcome};

/// The storage engine. Constructed once at process start with its store
/// and configuration injected; cheap to share behind an `Arc`.
pub struct Engine<S> {
    store: S,
    cfg: EngineConfig,
    cache: IndexCache,
}

impl<S: RemoteStore> Engine<S> {
    pub fn new(store: S, cfg: EngineConfig) -> Self {
        Self {
            store,
            cfg,
            cache: IndexCache::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub(crate) fn cache(&self) -> &IndexCache {
        &self.cache
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Result of one reconcile-on-read stats resolution, used by both the
/// read path and the pipeline preflight.
#[derive(Debug, Clone, Serialize)]
pub struct SlotCounts {
    pub count: usize,
    pub cover: Option<String>,
    pub total_size_mb: f64,
}
