//! Index schemas: `_PHOTOS.json`, `_SLOT.json`, `_REGION.json`
//!
//! Indexes are never trusted without validation. A failed `validate`
//! routes the caller to reconcile, which rebuilds the index from the
//! directory listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::SCHEMA_VERSION;

const MIB: f64 = 1024.0 * 1024.0;

/// One photo entry inside `_PHOTOS.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoItem {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// The authoritative per-slot content index (`_PHOTOS.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoIndex {
    pub version: u32,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    /// The per-slot photo cap in force when the index was written.
    pub limit: usize,
    /// First photo name, or null for an empty slot.
    pub cover: Option<String>,
    pub items: Vec<PhotoItem>,
}

impl PhotoIndex {
    /// Build an index from items; `count` and `cover` are derived.
    pub fn build(items: Vec<PhotoItem>, limit: usize, now: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            updated_at: now,
            count: items.len(),
            limit,
            cover: items.first().map(|i| i.name.clone()),
            items,
        }
    }

    /// Schema validation: version, count/items agreement, limit, cover.
    pub fn validate(&self, expected_limit: usize) -> std::result::Result<(), String> {
        if self.version != SCHEMA_VERSION {
            return Err(format!("unsupported version {}", self.version));
        }
        if self.count != self.items.len() {
            return Err(format!(
                "count {} disagrees with {} items",
                self.count,
                self.items.len()
            ));
        }
        if self.limit != expected_limit {
            return Err(format!(
                "limit {} disagrees with configured cap {}",
                self.limit, expected_limit
            ));
        }
        let expected_cover = self.items.first().map(|i| i.name.as_str());
        if self.cover.as_deref() != expected_cover {
            return Err(format!(
                "cover {:?} disagrees with first item {:?}",
                self.cover, expected_cover
            ));
        }
        if let Some(item) = self.items.iter().find(|i| i.name.is_empty()) {
            return Err(format!("item with empty name at size {}", item.size));
        }
        Ok(())
    }

    /// True while `updated_at` is within `ttl` of `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.updated_at).to_std() {
            Ok(age) => age <= ttl,
            // updated_at in the future reads as fresh; clocks drift.
            Err(_) => true,
        }
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.size).sum()
    }

    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes() as f64 / MIB
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.name == name)
    }
}

/// Derived per-slot summary (`_SLOT.json`). Never read as primary source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStats {
    pub count: usize,
    pub cover: Option<String>,
    pub total_size_mb: f64,
    pub updated_at: DateTime<Utc>,
}

impl SlotStats {
    /// Recalculate from a freshly written photo index.
    pub fn derive(index: &PhotoIndex) -> Self {
        Self {
            count: index.count,
            cover: index.cover.clone(),
            total_size_mb: (index.total_size_mb() * 100.0).round() / 100.0,
            updated_at: index.updated_at,
        }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.updated_at).to_std() {
            Ok(age) => age <= ttl,
            Err(_) => true,
        }
    }
}

/// One car entry inside `_REGION.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCar {
    pub region: String,
    pub make: String,
    pub model: String,
    pub vin: String,
    pub disk_root_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-region car listing (`_REGION.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionIndex {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub cars: Vec<RegionCar>,
}

impl RegionIndex {
    pub fn new(cars: Vec<RegionCar>, now: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            updated_at: now,
            cars,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version != SCHEMA_VERSION {
            return Err(format!("unsupported version {}", self.version));
        }
        if let Some(car) = self.cars.iter().find(|c| c.vin.len() != 17) {
            return Err(format!("malformed VIN {:?}", car.vin));
        }
        Ok(())
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.updated_at).to_std() {
            Ok(age) => age <= ttl,
            Err(_) => true,
        }
    }

    /// Insert or replace by VIN. Returns true when an entry was replaced.
    pub fn upsert(&mut self, car: RegionCar) -> bool {
        let existing = self.cars.iter_mut().find(|c| c.vin == car.vin);
        match existing {
            Some(slot) => {
                *slot = car;
                true
            }
            None => {
                self.cars.push(car);
                false
            }
        }
    }

    /// Drop an entry by VIN. Returns true when something was removed.
    pub fn remove(&mut self, vin: &str) -> bool {
        let before = self.cars.len();
        self.cars.retain(|c| c.vin != vin);
        self.cars.len() != before
    }
}
