//! Car metadata (`_CAR.json`) and the in-process car/slot views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::{ParsedCarFolder, SlotRef};

/// Per-car metadata file (`_CAR.json`).
///
/// The live fields are `region/make/model/vin`; the rest is lifecycle
/// history appended by create, archive and restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarMeta {
    pub region: String,
    pub make: String,
    pub model: String,
    pub vin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_by: Option<String>,
}

impl CarMeta {
    pub fn new(
        region: &str,
        make: &str,
        model: &str,
        vin: &str,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            region: region.to_string(),
            make: make.to_string(),
            model: model.to_string(),
            vin: vin.to_string(),
            created_at: Some(now),
            created_by: Some(created_by.to_string()),
            archived_at: None,
            archived_by: None,
            original_region: None,
            restored_at: None,
            restored_by: None,
        }
    }

    /// Required fields present and non-blank.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (field, value) in [
            ("region", &self.region),
            ("make", &self.make),
            ("model", &self.model),
            ("vin", &self.vin),
        ] {
            if value.trim().is_empty() {
                return Err(format!("missing required field '{}'", field));
            }
        }
        if self.vin.len() != 17 {
            return Err(format!("malformed VIN {:?}", self.vin));
        }
        Ok(())
    }

    /// The metadata must agree with the folder it lives in; a mismatch
    /// means somebody renamed the folder by hand.
    pub fn matches_folder(&self, parsed: &ParsedCarFolder) -> bool {
        self.vin.eq_ignore_ascii_case(parsed.vin.as_str())
            && self.make == parsed.make
            && self.model == parsed.model
    }
}

/// A loaded car: metadata plus its resolved root path.
#[derive(Debug, Clone, Serialize)]
pub struct Car {
    pub meta: CarMeta,
    pub root_path: String,
}

/// A car row in a region listing. Slot counts are loaded separately.
#[derive(Debug, Clone, Serialize)]
pub struct CarSummary {
    pub region: String,
    pub make: String,
    pub model: String,
    pub vin: String,
    pub disk_root_path: String,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// False until `load_car_slot_counts` has populated the counters.
    pub counts_loaded: bool,
    pub total_slots: usize,
    pub locked_slots: usize,
    pub empty_slots: usize,
}

/// One of a car's 14 slots as seen by a reader.
#[derive(Debug, Clone, Serialize)]
pub struct SlotDescriptor {
    pub slot: SlotRef,
    pub path: String,
    /// False while the counters below are placeholders.
    pub stats_loaded: bool,
    pub count: usize,
    pub cover: Option<String>,
    pub total_size_mb: f64,
    pub locked: bool,
    pub used: bool,
}

impl SlotDescriptor {
    /// Placeholder descriptor produced by the O(1) open-car path.
    pub fn placeholder(slot: SlotRef, path: String) -> Self {
        Self {
            slot,
            path,
            stats_loaded: false,
            count: 0,
            cover: None,
            total_size_mb: 0.0,
            locked: false,
            used: false,
        }
    }
}
