//! Read path: open car, resolve slot stats, list regions
//!
//! Reads are JSON-first: the engine trusts an index only when it parses,
//! validates and is within its TTL; anything else falls through to the
//! next source and ultimately to reconcile. Opening a car costs O(1)
//! remote calls; the per-slot counters load separately.

use tracing::debug;

use crate::errors::{DiskError, Result};
use crate::model::{
    Car, CarMeta, CarSummary, LockFile, PhotoIndex, RegionIndex, SlotDescriptor, SlotStats,
    CAR_FILE, LOCK_FILE, PHOTOS_FILE, REGION_FILE, SLOT_FILE, USED_FILE,
};
use crate::path::{
    get_all_slot_paths, join, normalize_region, parse_car_folder, region_root, Vin,
};
use crate::remote::RemoteStore;

use super::{now, Engine, SlotCounts};

impl<S: RemoteStore> Engine<S> {
    /// Read `_PHOTOS.json` if present, schema-valid and (unless
    /// `bypass_ttl`) within its TTL. `None` routes the caller to the
    /// next source or to reconcile. Writers read back with
    /// `bypass_ttl = true`.
    pub(crate) async fn read_photo_index(
        &self,
        slot_path: &str,
        bypass_ttl: bool,
    ) -> Result<Option<PhotoIndex>> {
        let photos_path = join(slot_path, PHOTOS_FILE);
        let ts = now();
        let ttl = self.config().photos_index_ttl();
        let cap = self.config().max_photos_per_slot;

        if let Some(cached) = self.cache().get_fresh(&photos_path, ttl, ts) {
            if let Ok(idx) = serde_json::from_value::<PhotoIndex>(cached) {
                if idx.validate(cap).is_ok() && (bypass_ttl || idx.is_fresh(ttl, ts)) {
                    return Ok(Some(idx));
                }
            }
        }

        match self.store().get_json(&photos_path).await {
            Ok(Some(value)) => match serde_json::from_value::<PhotoIndex>(value.clone()) {
                Ok(idx) => {
                    if let Err(reason) = idx.validate(cap) {
                        debug!(target: "car_loading", path = %photos_path, reason, "photo index invalid");
                        return Ok(None);
                    }
                    if !bypass_ttl && !idx.is_fresh(ttl, ts) {
                        return Ok(None);
                    }
                    self.cache().put(&photos_path, value, ts);
                    Ok(Some(idx))
                }
                Err(e) => {
                    debug!(target: "car_loading", path = %photos_path, error = %e, "photo index unparseable");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(DiskError::IndexCorrupt { path, detail }) => {
                debug!(target: "car_loading", path = %path, detail, "photo index corrupt");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `_PHOTOS.json` regardless of age, rebuilding it from the listing
    /// when missing or invalid. The pipeline preflight and merge both
    /// need the actual store state, not a freshness judgement.
    pub(crate) async fn photo_index_or_rebuild(&self, slot_path: &str) -> Result<PhotoIndex> {
        if let Some(idx) = self.read_photo_index(slot_path, true).await? {
            return Ok(idx);
        }
        let (idx, _) = self.reconcile_slot(slot_path).await?;
        Ok(idx)
    }

    /// Resolve slot counters through the priority chain:
    /// `_PHOTOS.json` → `_SLOT.json` → legacy `_LOCK.json` stats →
    /// reconcile.
    pub async fn slot_counts(&self, slot_path: &str) -> Result<SlotCounts> {
        if let Some(idx) = self.read_photo_index(slot_path, false).await? {
            let stats = SlotStats::derive(&idx);
            return Ok(SlotCounts {
                count: stats.count,
                cover: stats.cover,
                total_size_mb: stats.total_size_mb,
            });
        }

        let slot_file = join(slot_path, SLOT_FILE);
        let ts = now();
        let ttl = self.config().slot_stats_ttl();
        let cached = self.cache().get_fresh(&slot_file, ttl, ts);
        let raw = match cached {
            Some(v) => Some(v),
            None => match self.store().get_json(&slot_file).await {
                Ok(v) => v,
                Err(DiskError::IndexCorrupt { .. }) => None,
                Err(e) => return Err(e),
            },
        };
        if let Some(v) = raw {
            if let Ok(stats) = serde_json::from_value::<SlotStats>(v) {
                if stats.is_fresh(ttl, ts) {
                    return Ok(SlotCounts {
                        count: stats.count,
                        cover: stats.cover,
                        total_size_mb: stats.total_size_mb,
                    });
                }
            }
        }

        // Locks written by pre-index generations carried the counters.
        let lock_path = join(slot_path, LOCK_FILE);
        match self.store().get_json(&lock_path).await {
            Ok(Some(v)) => {
                if let Ok(lock) = serde_json::from_value::<LockFile>(v) {
                    if let Some((count, cover, total_size_mb)) = lock.legacy_stats() {
                        return Ok(SlotCounts {
                            count,
                            cover,
                            total_size_mb,
                        });
                    }
                }
            }
            Ok(None) => {}
            Err(DiskError::IndexCorrupt { .. }) => {}
            Err(e) => return Err(e),
        }

        let (idx, _) = self.reconcile_slot(slot_path).await?;
        let stats = SlotStats::derive(&idx);
        Ok(SlotCounts {
            count: stats.count,
            cover: stats.cover,
            total_size_mb: stats.total_size_mb,
        })
    }

    /// Locate a car by `(region, VIN)`: region index first, folder scan
    /// as the fallback. Returns the car root path and metadata.
    pub(crate) async fn find_car(&self, region: &str, vin: &Vin) -> Result<(String, CarMeta)> {
        let region = normalize_region(region);

        if let Ok(index) = self.region_index(&region, false).await {
            if let Some(entry) = index.cars.iter().find(|c| c.vin == vin.as_str()) {
                let meta_path = join(&entry.disk_root_path, CAR_FILE);
                if let Ok(Some(v)) = self.store().get_json(&meta_path).await {
                    if let Ok(meta) = serde_json::from_value::<CarMeta>(v) {
                        return Ok((entry.disk_root_path.clone(), meta));
                    }
                }
                // Index pointed at a folder that no longer answers;
                // fall through to the scan.
            }
        }

        let root = region_root(&self.config().base_dir, &region);
        let entries = match self.store().list(&root).await? {
            Some(entries) => entries,
            None => {
                return Err(DiskError::CarNotFound {
                    region,
                    vin: vin.as_str().to_string(),
                })
            }
        };

        for entry in entries.iter().filter(|e| e.is_dir()) {
            let Some(parsed) = parse_car_folder(&region, &entry.name) else {
                continue;
            };
            if parsed.vin != *vin {
                continue;
            }
            let meta_path = join(&entry.path, CAR_FILE);
            let meta = match self.store().get_json(&meta_path).await {
                Ok(Some(v)) => serde_json::from_value::<CarMeta>(v).ok(),
                Ok(None) => None,
                Err(DiskError::IndexCorrupt { .. }) => None,
                Err(e) => return Err(e),
            };
            // A missing metadata file does not hide the car; the folder
            // is truth and carries enough identity.
            let meta = meta.unwrap_or_else(|| CarMeta {
                region: region.clone(),
                make: parsed.make.clone(),
                model: parsed.model.clone(),
                vin: parsed.vin.as_str().to_string(),
                created_at: None,
                created_by: None,
                archived_at: None,
                archived_by: None,
                original_region: None,
                restored_at: None,
                restored_by: None,
            });
            return Ok((entry.path.clone(), meta));
        }

        Err(DiskError::CarNotFound {
            region,
            vin: vin.as_str().to_string(),
        })
    }

    /// Open a car: its metadata plus 14 placeholder slot descriptors.
    /// O(1) remote calls by construction; counters load separately via
    /// [`Engine::load_car_slot_counts`].
    pub async fn open_car(&self, region: &str, vin: &str) -> Result<(Car, Vec<SlotDescriptor>)> {
        let vin = Vin::parse(vin)?;
        if self.config().debug_car_loading {
            debug!(target: "car_loading", region, vin = %vin, "opening car");
        }
        let (root, meta) = self.find_car(region, &vin).await?;

        let slots = get_all_slot_paths(&root, &meta.make, &meta.model, &vin)
            .into_iter()
            .map(|(slot, path)| SlotDescriptor::placeholder(slot, path))
            .collect();

        Ok((
            Car {
                meta,
                root_path: root,
            },
            slots,
        ))
    }

    /// Populate all 14 slot descriptors with counters, lock and used
    /// state.
    pub async fn load_car_slot_counts(
        &self,
        region: &str,
        vin: &str,
    ) -> Result<Vec<SlotDescriptor>> {
        let (_, mut slots) = self.open_car(region, vin).await?;
        let ts = now();

        for desc in slots.iter_mut() {
            let counts = self.slot_counts(&desc.path).await?;
            desc.count = counts.count;
            desc.cover = counts.cover;
            desc.total_size_mb = counts.total_size_mb;

            let lock_path = join(&desc.path, LOCK_FILE);
            desc.locked = match self.store().get_json(&lock_path).await {
                Ok(Some(v)) => serde_json::from_value::<LockFile>(v)
                    .map(|l| !l.is_expired(ts))
                    .unwrap_or(false),
                Ok(None) => false,
                Err(DiskError::IndexCorrupt { .. }) => false,
                Err(e) => return Err(e),
            };

            desc.used = self.store().exists(&join(&desc.path, USED_FILE)).await?;
            desc.stats_loaded = true;
        }

        Ok(slots)
    }

    /// The region's car index, consulting cache → store → reconcile.
    pub(crate) async fn region_index(&self, region: &str, bypass_ttl: bool) -> Result<RegionIndex> {
        let region = normalize_region(region);
        let root = region_root(&self.config().base_dir, &region);
        let region_file = join(&root, REGION_FILE);
        let ts = now();
        let ttl = self.config().region_index_ttl();

        if let Some(cached) = self.cache().get_fresh(&region_file, ttl, ts) {
            if let Ok(idx) = serde_json::from_value::<RegionIndex>(cached) {
                if idx.validate().is_ok() && (bypass_ttl || idx.is_fresh(ttl, ts)) {
                    return Ok(idx);
                }
            }
        }

        match self.store().get_json(&region_file).await {
            Ok(Some(value)) => {
                if let Ok(idx) = serde_json::from_value::<RegionIndex>(value.clone()) {
                    if idx.validate().is_ok() && (bypass_ttl || idx.is_fresh(ttl, ts)) {
                        self.cache().put(&region_file, value, ts);
                        return Ok(idx);
                    }
                }
                if self.config().debug_region_index {
                    debug!(target: "region_index", region = %region, "region index stale or invalid, rebuilding");
                }
            }
            Ok(None) => {}
            Err(DiskError::IndexCorrupt { .. }) => {}
            Err(e) => return Err(e),
        }

        let (idx, _) = self.reconcile_region(&region).await?;
        Ok(idx)
    }

    /// Region listing for the car-list view. Counters are placeholders
    /// until loaded per car.
    pub async fn list_cars_by_region(&self, region: &str) -> Result<Vec<CarSummary>> {
        let index = self.region_index(region, false).await?;
        Ok(index
            .cars
            .into_iter()
            .map(|c| CarSummary {
                region: c.region,
                make: c.make,
                model: c.model,
                vin: c.vin,
                disk_root_path: c.disk_root_path,
                created_by: c.created_by,
                created_at: c.created_at,
                counts_loaded: false,
                total_slots: 14,
                locked_slots: 0,
                empty_slots: 0,
            })
            .collect())
    }
}
