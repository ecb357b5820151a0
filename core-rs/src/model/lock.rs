//! Slot sidecars: `_LOCK.json`, `_DIRTY.json`, `_USED.json`,
//! `_PUBLISHED.json`

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Write-pipeline lock held during the commit-index stage.
///
/// The lock lives on the remote store because the store is the only
/// shared resource; process memory cannot serialize writers across
/// replicas. A lock past `expires_at` is dead and may be reacquired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub operation: String,
    pub slot_path: String,

    // Pre-index generations stored slot stats inside the lock file.
    // Read-only fallback for slots that have not been touched since.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size_mb: Option<f64>,
}

impl LockFile {
    pub fn new(
        locked_by: &str,
        operation: &str,
        slot_path: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(5));
        Self {
            locked_by: locked_by.to_string(),
            locked_at: now,
            expires_at: now + ttl,
            operation: operation.to_string(),
            slot_path: slot_path.to_string(),
            count: None,
            cover: None,
            total_size_mb: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Same writer, same acquisition. `locked_at` carries sub-second
    /// precision, which is what distinguishes two acquisitions by the
    /// same account.
    pub fn same_acquisition(&self, other: &LockFile) -> bool {
        self.locked_by == other.locked_by && self.locked_at == other.locked_at
    }

    /// Legacy stats payload, if this lock predates `_SLOT.json`.
    pub fn legacy_stats(&self) -> Option<(usize, Option<String>, f64)> {
        self.count
            .map(|count| (count, self.cover.clone(), self.total_size_mb.unwrap_or(0.0)))
    }
}

/// Marker that a slot's index may disagree with its files
/// (`_DIRTY.json`). Written by the verify stage, consumed by reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtyMarker {
    pub marked_at: DateTime<Utc>,
    pub reason: String,
    pub slot_path: String,
}

impl DirtyMarker {
    pub fn new(reason: &str, slot_path: &str, now: DateTime<Utc>) -> Self {
        Self {
            marked_at: now,
            reason: reason.to_string(),
            slot_path: slot_path.to_string(),
        }
    }
}

/// Administrative "slot used" flag (`_USED.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsedMarker {
    pub used: bool,
    pub marked_at: DateTime<Utc>,
    pub marked_by: String,
}

/// Cached public URL for a published slot (`_PUBLISHED.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedUrl {
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub published_by: String,
}
