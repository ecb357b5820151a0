//! In-process index cache
//!
//! Caches deserialized index documents keyed by normalized path. Entries
//! are only served within the caller-supplied TTL; anything older must
//! re-validate against the store. Writers repopulate their entry
//! immediately after a store write so the next read reflects the write
//! without waiting out the TTL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

struct CacheEntry {
    value: Value,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry younger than `ttl`, or nothing.
    pub fn get_fresh(&self, path: &str, ttl: Duration, now: DateTime<Utc>) -> Option<Value> {
        let entries = self.lock();
        let entry = entries.get(path)?;
        match now.signed_duration_since(entry.inserted_at).to_std() {
            Ok(age) if age <= ttl => Some(entry.value.clone()),
            Ok(_) => None,
            // Inserted-at in the future: clock moved; treat as fresh.
            Err(_) => Some(entry.value.clone()),
        }
    }

    pub fn put(&self, path: &str, value: Value, now: DateTime<Utc>) {
        self.lock().insert(
            path.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn invalidate(&self, path: &str) {
        self.lock().remove(path);
    }

    /// Drop every entry at or under `prefix`. Used when a car root moves.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let sub = format!("{}/", prefix);
        self.lock()
            .retain(|key, _| key != prefix && !key.starts_with(&sub));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}
