//! Reconciliation: rebuild derived indexes from the directory listing
//!
//! The directory listing is truth; `_PHOTOS.json`, `_SLOT.json` and
//! `_REGION.json` are projections of it. Reconcile runs at three depths
//! (slot, car, region), is idempotent (a second run with no external
//! changes writes nothing), and only ever runs inside a caller's
//! request — reads trigger it when an index is missing, corrupt or past
//! its TTL.

use serde::Serialize;
use tracing::debug;

use crate::errors::{DiskError, Result};
use crate::model::{
    is_meta_name, CarMeta, PhotoIndex, PhotoItem, RegionCar, RegionIndex, SlotStats, CAR_FILE,
    DIRTY_FILE, PHOTOS_FILE, REGION_FILE, SLOT_FILE,
};
use crate::path::{
    assert_disk_path, get_all_slot_paths, join, normalize_region, parse_car_folder, region_root,
    Vin,
};
use crate::remote::RemoteStore;

use super::{now, Engine};

/// How deep a reconcile pass goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileDepth {
    Slot,
    Car,
    Region,
}

impl ReconcileDepth {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "slot" => Ok(ReconcileDepth::Slot),
            "car" => Ok(ReconcileDepth::Car),
            "region" => Ok(ReconcileDepth::Region),
            other => Err(DiskError::PathSyntax {
                stage: "reconcile".to_string(),
                path: other.to_string(),
                reason: "depth must be slot, car or region".to_string(),
            }),
        }
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub actions_performed: Vec<String>,
    pub repaired_files: Vec<String>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.actions_performed.extend(other.actions_performed);
        self.repaired_files.extend(other.repaired_files);
        self.errors.extend(other.errors);
    }
}

impl<S: RemoteStore> Engine<S> {
    /// Operator-facing entry point. For `Region` depth the path may be a
    /// bare region tag or any path whose last segment is the tag.
    pub async fn reconcile(&self, path: &str, depth: ReconcileDepth) -> Result<ReconcileReport> {
        match depth {
            ReconcileDepth::Slot => self.reconcile_slot(path).await.map(|(_, r)| r),
            ReconcileDepth::Car => self.reconcile_car(path).await,
            ReconcileDepth::Region => {
                let tag = path.rsplit('/').next().unwrap_or(path);
                self.reconcile_region(tag).await.map(|(_, r)| r)
            }
        }
    }

    /// Rebuild `_PHOTOS.json` + `_SLOT.json` from the slot listing and
    /// clear the dirty marker. Skips the writes when the stored index
    /// already matches the listing, which is what makes a second run a
    /// no-op.
    pub(crate) async fn reconcile_slot(
        &self,
        slot_path: &str,
    ) -> Result<(PhotoIndex, ReconcileReport)> {
        let slot_path = assert_disk_path(slot_path, "reconcileSlot")?;
        let mut report = ReconcileReport::default();

        let entries = match self.store().list(&slot_path).await? {
            Some(entries) => entries,
            None => {
                self.store().ensure_dir(&slot_path).await?;
                report
                    .actions_performed
                    .push(format!("created missing slot directory {}", slot_path));
                Vec::new()
            }
        };

        let mut items: Vec<PhotoItem> = entries
            .iter()
            .filter(|e| e.is_file() && !is_meta_name(&e.name))
            .map(|e| PhotoItem {
                name: e.name.clone(),
                size: e.size,
                modified: e.modified,
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let photos_path = join(&slot_path, PHOTOS_FILE);
        let slot_file = join(&slot_path, SLOT_FILE);
        let cap = self.config().max_photos_per_slot;
        let ts = now();

        let existing = match self.store().get_json(&photos_path).await {
            Ok(Some(v)) => serde_json::from_value::<PhotoIndex>(v)
                .ok()
                .filter(|idx| idx.validate(cap).is_ok()),
            Ok(None) => None,
            Err(DiskError::IndexCorrupt { .. }) => None,
            Err(e) => return Err(e),
        };

        let index = match existing {
            Some(idx) if idx.items == items => {
                // Index already agrees with the listing; only resurrect
                // the derived summary if it went missing.
                if !self.store().exists(&slot_file).await? {
                    let stats = SlotStats::derive(&idx);
                    self.store()
                        .put_json(&slot_file, &serde_json::to_value(&stats)?)
                        .await?;
                    report.repaired_files.push(slot_file.clone());
                }
                idx
            }
            _ => {
                let idx = PhotoIndex::build(items, cap, ts);
                self.store()
                    .put_json(&photos_path, &serde_json::to_value(&idx)?)
                    .await?;
                report.repaired_files.push(photos_path.clone());

                let stats = SlotStats::derive(&idx);
                self.store()
                    .put_json(&slot_file, &serde_json::to_value(&stats)?)
                    .await?;
                report.repaired_files.push(slot_file.clone());

                report
                    .actions_performed
                    .push(format!("rebuilt index for {} ({} items)", slot_path, idx.count));
                idx
            }
        };

        let dirty_path = join(&slot_path, DIRTY_FILE);
        if self.store().exists(&dirty_path).await? {
            self.store().delete(&dirty_path).await?;
            report
                .actions_performed
                .push(format!("cleared dirty marker {}", dirty_path));
        }

        // TTL-bypass repopulation: the caller who triggered the rebuild
        // reads fresh data immediately.
        self.cache()
            .put(&photos_path, serde_json::to_value(&index)?, ts);
        self.cache()
            .put(&slot_file, serde_json::to_value(&SlotStats::derive(&index))?, ts);

        Ok((index, report))
    }

    /// Validate `_CAR.json`, repair the 1+8+5 slot structure, and
    /// reconcile every slot.
    pub(crate) async fn reconcile_car(&self, car_root: &str) -> Result<ReconcileReport> {
        let car_root = assert_disk_path(car_root, "reconcileCar")?;
        let mut report = ReconcileReport::default();

        // The folder name itself is the fallback identity when the
        // metadata file is gone.
        let mut segments = car_root.rsplit('/');
        let folder = segments.next().unwrap_or_default().to_string();
        let region_seg = segments.next().unwrap_or_default().to_string();
        let parsed = parse_car_folder(&region_seg, &folder);

        let meta_path = join(&car_root, CAR_FILE);
        let meta = match self.store().get_json(&meta_path).await {
            Ok(Some(v)) => match serde_json::from_value::<CarMeta>(v) {
                Ok(meta) => {
                    if let Err(e) = meta.validate() {
                        report.errors.push(format!("{}: {}", meta_path, e));
                    }
                    if let Some(ref parsed) = parsed {
                        if !meta.matches_folder(parsed) {
                            report.errors.push(format!(
                                "{}: metadata disagrees with folder name {:?}",
                                meta_path, folder
                            ));
                        }
                    }
                    Some(meta)
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: schema mismatch: {}", meta_path, e));
                    None
                }
            },
            Ok(None) => {
                report.errors.push(format!("{}: missing", meta_path));
                None
            }
            Err(DiskError::IndexCorrupt { detail, .. }) => {
                report.errors.push(format!("{}: {}", meta_path, detail));
                None
            }
            Err(e) => return Err(e),
        };

        let (make, model, vin) = match (&meta, &parsed) {
            (Some(m), _) => match Vin::parse(&m.vin) {
                Ok(vin) => (m.make.clone(), m.model.clone(), vin),
                Err(_) => {
                    report
                        .errors
                        .push(format!("{}: unusable VIN {:?}", meta_path, m.vin));
                    return Ok(report);
                }
            },
            (None, Some(p)) => (p.make.clone(), p.model.clone(), p.vin.clone()),
            (None, None) => {
                report
                    .errors
                    .push(format!("{}: folder name unparseable, cannot reconcile", car_root));
                return Ok(report);
            }
        };

        let expected = get_all_slot_paths(&car_root, &make, &model, &vin);
        for (slot, slot_path) in &expected {
            if !self.store().exists(slot_path).await? {
                self.store().ensure_dir(slot_path).await?;
                report
                    .actions_performed
                    .push(format!("created missing slot {} at {}", slot, slot_path));
            }
        }

        for (_, slot_path) in &expected {
            let (_, slot_report) = self.reconcile_slot(slot_path).await?;
            report.merge(slot_report);
        }

        Ok(report)
    }

    /// Rebuild `_REGION.json` from the region folder listing.
    pub(crate) async fn reconcile_region(
        &self,
        region: &str,
    ) -> Result<(RegionIndex, ReconcileReport)> {
        let region = normalize_region(region);
        let root = region_root(&self.config().base_dir, &region);
        let mut report = ReconcileReport::default();

        if self.config().debug_region_index {
            debug!(target: "region_index", region = %region, "reconciling region index");
        }

        self.store().ensure_dir(&root).await?;
        let entries = self.store().list(&root).await?.unwrap_or_default();

        let mut cars = Vec::new();
        for entry in entries.iter().filter(|e| e.is_dir()) {
            let Some(parsed) = parse_car_folder(&region, &entry.name) else {
                report
                    .errors
                    .push(format!("{}: folder name unparseable, skipped", entry.path));
                continue;
            };

            let meta_path = join(&entry.path, CAR_FILE);
            let meta = match self.store().get_json(&meta_path).await {
                Ok(Some(v)) => serde_json::from_value::<CarMeta>(v).ok(),
                Ok(None) => None,
                Err(DiskError::IndexCorrupt { .. }) => None,
                Err(e) => return Err(e),
            };
            if meta.is_none() {
                report
                    .errors
                    .push(format!("{}: missing or corrupt, listed from folder name", meta_path));
            }

            let car = match meta {
                Some(m) => RegionCar {
                    region: m.region,
                    make: m.make,
                    model: m.model,
                    vin: m.vin.to_uppercase(),
                    disk_root_path: entry.path.clone(),
                    created_by: m.created_by,
                    created_at: m.created_at,
                },
                None => RegionCar {
                    region: region.clone(),
                    make: parsed.make,
                    model: parsed.model,
                    vin: parsed.vin.as_str().to_string(),
                    disk_root_path: entry.path.clone(),
                    created_by: None,
                    created_at: None,
                },
            };
            cars.push(car);
        }
        cars.sort_by(|a, b| a.vin.cmp(&b.vin));

        let region_file = join(&root, REGION_FILE);
        let ts = now();

        let existing = match self.store().get_json(&region_file).await {
            Ok(Some(v)) => serde_json::from_value::<RegionIndex>(v)
                .ok()
                .filter(|idx| idx.validate().is_ok()),
            Ok(None) => None,
            Err(DiskError::IndexCorrupt { .. }) => None,
            Err(e) => return Err(e),
        };

        let index = match existing {
            Some(idx) if idx.cars == cars => idx,
            _ => {
                let idx = RegionIndex::new(cars, ts);
                self.store()
                    .put_json(&region_file, &serde_json::to_value(&idx)?)
                    .await?;
                report.repaired_files.push(region_file.clone());
                report
                    .actions_performed
                    .push(format!("rebuilt region index for {} ({} cars)", region, idx.cars.len()));
                idx
            }
        };

        self.cache()
            .put(&region_file, serde_json::to_value(&index)?, ts);

        Ok((index, report))
    }
}
