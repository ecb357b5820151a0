//! Car lifecycle: create, archive, restore
//!
//! These are the operations the engine itself initiates, so their region
//! index updates are synchronous and required — a failure surfaces as a
//! `RegionIndexUpdate` error instead of a warning log, because the
//! folder and `_CAR.json` already exist and the caller must know to
//! retry.

use tokio::time::sleep;
use tracing::debug;

use crate::config::ARCHIVE_REGION;
use crate::errors::{DiskError, Result};
use crate::model::{Car, CarMeta, RegionCar, RegionIndex, CAR_FILE, REGION_FILE};
use crate::path::{
    archive_folder_name, car_root, get_all_slot_paths, join, normalize_region, parse_car_folder,
    region_root, SlotType, Vin,
};
use crate::remote::RemoteStore;

use super::{now, Engine};

impl<S: RemoteStore> Engine<S> {
    /// Create a car with its full 1+8+5 slot structure.
    pub async fn create_car(
        &self,
        region: &str,
        make: &str,
        model: &str,
        vin: &str,
        created_by: &str,
    ) -> Result<Car> {
        let region = normalize_region(region);
        if region == ARCHIVE_REGION {
            return Err(DiskError::RegionDenied(region));
        }
        let vin = Vin::parse(vin)?;
        let make = make.trim();
        let model = model.trim();
        if make.is_empty() || model.is_empty() {
            return Err(DiskError::PathSyntax {
                stage: "createCar".to_string(),
                path: format!("{} {}", make, model),
                reason: "make and model are required".to_string(),
            });
        }

        match self.find_car(&region, &vin).await {
            Ok((root, _)) => return Err(DiskError::AlreadyExists(root)),
            Err(DiskError::CarNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let root = car_root(&self.config().base_dir, &region, make, model, &vin);
        self.store().ensure_dir(&root).await?;

        let ts = now();
        let meta = CarMeta::new(&region, make, model, vin.as_str(), created_by, ts);
        self.store()
            .put_json(&join(&root, CAR_FILE), &serde_json::to_value(&meta)?)
            .await?;

        for slot_type in SlotType::all() {
            self.store()
                .ensure_dir(&join(&root, slot_type.folder_name()))
                .await?;
        }
        let slot_paths = get_all_slot_paths(&root, make, model, &vin);
        for (_, slot_path) in &slot_paths {
            self.store().ensure_dir(slot_path).await?;
        }

        // Re-list and assert the structure actually landed.
        let mut found = 0usize;
        for slot_type in SlotType::all() {
            let family = join(&root, slot_type.folder_name());
            let entries = self.store().list(&family).await?.unwrap_or_default();
            found += entries.iter().filter(|e| e.is_dir()).count();
        }
        if found != 14 {
            return Err(DiskError::IndexCorrupt {
                path: root,
                detail: format!("expected 14 slot directories after create, found {}", found),
            });
        }

        // Step 7: the region index update is part of the operation.
        let entry = RegionCar {
            region: region.clone(),
            make: meta.make.clone(),
            model: meta.model.clone(),
            vin: meta.vin.clone(),
            disk_root_path: root.clone(),
            created_by: meta.created_by.clone(),
            created_at: meta.created_at,
        };
        self.upsert_region_index(&region, entry)
            .await
            .map_err(|e| DiskError::RegionIndexUpdate {
                region: region.clone(),
                source: Box::new(e),
            })?;

        debug!(target: "car_loading", region = %region, vin = %meta.vin, "car created");
        Ok(Car {
            meta,
            root_path: root,
        })
    }

    /// Archive a car into the `ALL` region under its underscore name.
    /// Returns the archived root path.
    pub async fn archive_car(&self, region: &str, vin: &str, actor: &str) -> Result<String> {
        let region = normalize_region(region);
        if region == ARCHIVE_REGION {
            return Err(DiskError::RegionDenied(region));
        }
        let vin = Vin::parse(vin)?;
        let (root, meta) = self.find_car(&region, &vin).await?;

        let archive_root = region_root(&self.config().base_dir, ARCHIVE_REGION);
        self.store().ensure_dir(&archive_root).await?;
        let target = join(
            &archive_root,
            &archive_folder_name(&region, &meta.make, &meta.model, &vin),
        );

        self.move_with_retry(&root, &target).await?;

        // The metadata rewrite is fatal on failure: without it the
        // archive folder claims the wrong region.
        let ts = now();
        let mut archived = meta.clone();
        archived.region = ARCHIVE_REGION.to_string();
        archived.archived_at = Some(ts);
        archived.archived_by = Some(actor.to_string());
        archived.original_region = Some(region.clone());
        self.store()
            .put_json(&join(&target, CAR_FILE), &serde_json::to_value(&archived)?)
            .await?;

        self.remove_from_region_index(&region, vin.as_str())
            .await
            .map_err(|e| DiskError::RegionIndexUpdate {
                region: region.clone(),
                source: Box::new(e),
            })?;

        let entry = RegionCar {
            region: ARCHIVE_REGION.to_string(),
            make: archived.make.clone(),
            model: archived.model.clone(),
            vin: archived.vin.clone(),
            disk_root_path: target.clone(),
            created_by: archived.created_by.clone(),
            created_at: archived.created_at,
        };
        self.upsert_region_index(ARCHIVE_REGION, entry)
            .await
            .map_err(|e| DiskError::RegionIndexUpdate {
                region: ARCHIVE_REGION.to_string(),
                source: Box::new(e),
            })?;

        self.cache().invalidate_prefix(&root);
        Ok(target)
    }

    /// Restore an archived car into `target_region` under its space
    /// name. Fails with `AlreadyExists` when the VIN is already present
    /// there.
    pub async fn restore_car(&self, vin: &str, target_region: &str, actor: &str) -> Result<Car> {
        let target_region = normalize_region(target_region);
        if target_region == ARCHIVE_REGION {
            return Err(DiskError::RegionDenied(target_region));
        }
        let vin = Vin::parse(vin)?;

        // Locate the archived folder by scanning the archive listing;
        // the underscore form encodes the original region.
        let archive_root = region_root(&self.config().base_dir, ARCHIVE_REGION);
        let entries = self.store().list(&archive_root).await?.unwrap_or_default();
        let mut found: Option<String> = None;
        for entry in entries.iter().filter(|e| e.is_dir()) {
            if let Some(parsed) = parse_car_folder(ARCHIVE_REGION, &entry.name) {
                if parsed.vin == vin {
                    found = Some(entry.path.clone());
                    break;
                }
            }
        }
        let archived_path = found.ok_or_else(|| DiskError::CarNotFound {
            region: ARCHIVE_REGION.to_string(),
            vin: vin.as_str().to_string(),
        })?;

        let meta = match self
            .store()
            .get_json(&join(&archived_path, CAR_FILE))
            .await
        {
            Ok(Some(v)) => serde_json::from_value::<CarMeta>(v).ok(),
            Ok(None) => None,
            Err(DiskError::IndexCorrupt { .. }) => None,
            Err(e) => return Err(e),
        };
        let meta = match meta {
            Some(m) => m,
            None => {
                // Identity from the folder name; lifecycle history is lost
                // but the car is not.
                let parsed = parse_car_folder(ARCHIVE_REGION, archived_path.rsplit('/').next().unwrap_or_default())
                    .ok_or_else(|| DiskError::CarNotFound {
                        region: ARCHIVE_REGION.to_string(),
                        vin: vin.as_str().to_string(),
                    })?;
                CarMeta {
                    region: ARCHIVE_REGION.to_string(),
                    make: parsed.make,
                    model: parsed.model,
                    vin: parsed.vin.as_str().to_string(),
                    created_at: None,
                    created_by: None,
                    archived_at: None,
                    archived_by: None,
                    original_region: Some(parsed.region),
                    restored_at: None,
                    restored_by: None,
                }
            }
        };

        match self.find_car(&target_region, &vin).await {
            Ok((existing, _)) => return Err(DiskError::AlreadyExists(existing)),
            Err(DiskError::CarNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let new_root = car_root(
            &self.config().base_dir,
            &target_region,
            &meta.make,
            &meta.model,
            &vin,
        );
        self.store()
            .ensure_dir(&region_root(&self.config().base_dir, &target_region))
            .await?;
        self.move_with_retry(&archived_path, &new_root).await?;

        let ts = now();
        let mut restored = meta;
        restored.region = target_region.clone();
        restored.restored_at = Some(ts);
        restored.restored_by = Some(actor.to_string());
        restored.original_region = None;
        self.store()
            .put_json(&join(&new_root, CAR_FILE), &serde_json::to_value(&restored)?)
            .await?;

        self.remove_from_region_index(ARCHIVE_REGION, vin.as_str())
            .await
            .map_err(|e| DiskError::RegionIndexUpdate {
                region: ARCHIVE_REGION.to_string(),
                source: Box::new(e),
            })?;
        let entry = RegionCar {
            region: target_region.clone(),
            make: restored.make.clone(),
            model: restored.model.clone(),
            vin: restored.vin.clone(),
            disk_root_path: new_root.clone(),
            created_by: restored.created_by.clone(),
            created_at: restored.created_at,
        };
        self.upsert_region_index(&target_region, entry)
            .await
            .map_err(|e| DiskError::RegionIndexUpdate {
                region: target_region.clone(),
                source: Box::new(e),
            })?;

        self.cache().invalidate_prefix(&archived_path);
        Ok(Car {
            meta: restored,
            root_path: new_root,
        })
    }

    /// Move with up to 3 attempts on transient failure; a destination
    /// conflict gets exactly one overwrite retry, then aborts.
    async fn move_with_retry(&self, from: &str, to: &str) -> Result<()> {
        let base = std::time::Duration::from_millis(self.config().archive_retry_delay_ms);
        for attempt in 0u32..2 {
            match self.store().move_path(from, to, false).await {
                Ok(()) => return Ok(()),
                Err(DiskError::AlreadyExists(_)) => {
                    return self.store().move_path(from, to, true).await;
                }
                Err(DiskError::RemoteTransient { .. }) => sleep(base * (1 << attempt)).await,
                Err(e) => return Err(e),
            }
        }
        match self.store().move_path(from, to, false).await {
            Err(DiskError::AlreadyExists(_)) => self.store().move_path(from, to, true).await,
            other => other,
        }
    }

    /// Read-or-rebuild the region index, upsert one car, write it back.
    pub(crate) async fn upsert_region_index(&self, region: &str, car: RegionCar) -> Result<()> {
        let mut index = self.load_region_index_for_update(region).await?;
        index.upsert(car);
        self.write_region_index(region, index).await
    }

    pub(crate) async fn remove_from_region_index(&self, region: &str, vin: &str) -> Result<()> {
        let mut index = self.load_region_index_for_update(region).await?;
        index.remove(vin);
        self.write_region_index(region, index).await
    }

    /// A valid on-store index, or a freshly reconciled one. Never starts
    /// from empty: a corrupt index must not silently drop the other
    /// cars.
    async fn load_region_index_for_update(&self, region: &str) -> Result<RegionIndex> {
        let region = normalize_region(region);
        let root = region_root(&self.config().base_dir, &region);
        let region_file = join(&root, REGION_FILE);
        match self.store().get_json(&region_file).await {
            Ok(Some(v)) => {
                if let Ok(idx) = serde_json::from_value::<RegionIndex>(v) {
                    if idx.validate().is_ok() {
                        return Ok(idx);
                    }
                }
            }
            Ok(None) => {}
            Err(DiskError::IndexCorrupt { .. }) => {}
            Err(e) => return Err(e),
        }
        let (idx, _) = self.reconcile_region(&region).await?;
        Ok(idx)
    }

    async fn write_region_index(&self, region: &str, mut index: RegionIndex) -> Result<()> {
        let region = normalize_region(region);
        let root = region_root(&self.config().base_dir, &region);
        let region_file = join(&root, REGION_FILE);
        let ts = now();
        index.updated_at = ts;
        self.store().ensure_dir(&root).await?;
        let value = serde_json::to_value(&index)?;
        self.store().put_json(&region_file, &value).await?;
        self.cache().put(&region_file, value, ts);
        if self.config().debug_region_index {
            debug!(target: "region_index", region = %region, cars = index.cars.len(), "region index written");
        }
        Ok(())
    }
}
