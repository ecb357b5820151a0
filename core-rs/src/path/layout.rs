//! On-store layout: regions, car folders, the 14-slot taxonomy
//!
//! Layout under the base directory:
//!
//! ```text
//! <BASE>/<REGION>/<Make> <Model> <VIN>/
//!   1. Dealer photos/<Make> <Model> <VIN>/
//!   2. Buyout photos/<i>. <Make> <Model> <VIN>/   i in 1..=8
//!   3. Dummy photos/<i>. <Make> <Model> <VIN>/    i in 1..=5
//!
//! <BASE>/ALL/<ORIG>_<Make>_<Model>_<VIN>/          (archived cars)
//! ```
//!
//! Slot subdirectories always carry the space form of the car name; an
//! archive move renames only the car root, never its children.

use serde::{Deserialize, Serialize};

use crate::config::ARCHIVE_REGION;
use crate::errors::{DiskError, Result};
use crate::path::normalize::{join, sanitize_segment};

/// One of the three slot families under a car root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Dealer,
    Buyout,
    Dummies,
}

impl SlotType {
    /// Fixed slot count for this family (1 + 8 + 5 = 14).
    pub fn capacity(self) -> u8 {
        match self {
            SlotType::Dealer => 1,
            SlotType::Buyout => 8,
            SlotType::Dummies => 5,
        }
    }

    /// Folder name of the family directory under the car root.
    pub fn folder_name(self) -> &'static str {
        match self {
            SlotType::Dealer => "1. Dealer photos",
            SlotType::Buyout => "2. Buyout photos",
            SlotType::Dummies => "3. Dummy photos",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotType::Dealer => "dealer",
            SlotType::Buyout => "buyout",
            SlotType::Dummies => "dummies",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dealer" => Ok(SlotType::Dealer),
            "buyout" => Ok(SlotType::Buyout),
            "dummies" => Ok(SlotType::Dummies),
            other => Err(DiskError::SlotInvalid {
                slot_type: other.to_string(),
                index: 0,
            }),
        }
    }

    pub fn all() -> [SlotType; 3] {
        [SlotType::Dealer, SlotType::Buyout, SlotType::Dummies]
    }
}

/// A validated `(slot_type, index)` pair. Indexes are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub slot_type: SlotType,
    pub index: u8,
}

impl SlotRef {
    /// Validate the index against the family capacity.
    pub fn new(slot_type: SlotType, index: u8) -> Result<Self> {
        if index == 0 || index > slot_type.capacity() {
            return Err(DiskError::SlotInvalid {
                slot_type: slot_type.as_str().to_string(),
                index,
            });
        }
        Ok(Self { slot_type, index })
    }

    /// Slot directory name inside the family folder.
    ///
    /// The dealer slot carries the bare car name; buyout and dummy slots
    /// prefix it with `<i>. `.
    pub fn dir_name(&self, car_name: &str) -> String {
        match self.slot_type {
            SlotType::Dealer => car_name.to_string(),
            _ => format!("{}. {}", self.index, car_name),
        }
    }
}

impl std::fmt::Display for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.slot_type.as_str(), self.index)
    }
}

/// A validated 17-character alphanumeric VIN, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vin(String);

impl Vin {
    pub fn parse(raw: &str) -> Result<Self> {
        let candidate = raw.trim().to_uppercase();
        if candidate.len() != 17 || !candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DiskError::VinInvalid(raw.to_string()));
        }
        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Vin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim + uppercase a region tag.
pub fn normalize_region(region: &str) -> String {
    region.trim().to_uppercase()
}

/// `<Make> <Model> <VIN>` — the car folder name in every live region.
pub fn car_folder_name(make: &str, model: &str, vin: &Vin) -> String {
    format!(
        "{} {} {}",
        sanitize_segment(make),
        sanitize_segment(model),
        vin.as_str()
    )
}

/// `<ORIG>_<Make>_<Model>_<VIN>` — the folder name inside the archive
/// region. Make and model have their underscores folded so the name
/// stays parseable.
pub fn archive_folder_name(orig_region: &str, make: &str, model: &str, vin: &Vin) -> String {
    format!(
        "{}_{}_{}_{}",
        normalize_region(orig_region),
        sanitize_segment(make).replace('_', "-"),
        sanitize_segment(model).replace('_', "-"),
        vin.as_str()
    )
}

/// Region directory: `<base>/<REGION>`.
pub fn region_root(base: &str, region: &str) -> String {
    join(base, &normalize_region(region))
}

/// Car root directory for a live region (space form) or the archive
/// (underscore form, which additionally needs the original region).
pub fn car_root(base: &str, region: &str, make: &str, model: &str, vin: &Vin) -> String {
    join(&region_root(base, region), &car_folder_name(make, model, vin))
}

/// Slot directory path under a car root.
pub fn slot_path(car_root: &str, slot: SlotRef, make: &str, model: &str, vin: &Vin) -> String {
    let family = join(car_root, slot.slot_type.folder_name());
    join(&family, &slot.dir_name(&car_folder_name(make, model, vin)))
}

/// All 14 slot paths in deterministic order: dealer, buyout 1..=8,
/// dummies 1..=5.
pub fn get_all_slot_paths(
    car_root: &str,
    make: &str,
    model: &str,
    vin: &Vin,
) -> Vec<(SlotRef, String)> {
    let mut out = Vec::with_capacity(14);
    for slot_type in SlotType::all() {
        for index in 1..=slot_type.capacity() {
            // Index range comes straight from the capacity, so new() holds.
            if let Ok(slot) = SlotRef::new(slot_type, index) {
                out.push((slot, slot_path(car_root, slot, make, model, vin)));
            }
        }
    }
    out
}

/// A car identity recovered from a folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCarFolder {
    /// Original region: the listing region for live cars, the encoded
    /// original for archive entries.
    pub region: String,
    pub make: String,
    pub model: String,
    pub vin: Vin,
}

/// Parse a car folder name in the convention of `region`.
///
/// Live regions use the space form `<Make> <Model> <VIN>`; the archive
/// uses `<ORIG>_<Make>_<Model>_<VIN>`. Returns `None` for folders that
/// do not parse (the caller skips them).
pub fn parse_car_folder(region: &str, folder: &str) -> Option<ParsedCarFolder> {
    let region = normalize_region(region);
    if region == ARCHIVE_REGION {
        let parts: Vec<&str> = folder.split('_').collect();
        if parts.len() < 4 {
            return None;
        }
        let vin = Vin::parse(parts[parts.len() - 1]).ok()?;
        let orig = normalize_region(parts[0]);
        if orig.is_empty() || orig == ARCHIVE_REGION {
            return None;
        }
        Some(ParsedCarFolder {
            region: orig,
            make: parts[1].to_string(),
            model: parts[2..parts.len() - 1].join("_"),
            vin,
        })
    } else {
        let parts: Vec<&str> = folder.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        let vin = Vin::parse(parts[parts.len() - 1]).ok()?;
        Some(ParsedCarFolder {
            region,
            make: parts[0].to_string(),
            model: parts[1..parts.len() - 1].join(" "),
            vin,
        })
    }
}
