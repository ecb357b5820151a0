//! API boundary
//!
//! Thin adapters between the HTTP layer and the storage engine: region
//! access checks, per-request upload caps, slot resolution. HTTP routing
//! itself, sessions and form parsing live outside this crate.

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{Engine, ReconcileDepth, ReconcileReport, UploadFile, UploadOutcome};
use crate::errors::{DiskError, Result};
use crate::model::{Car, CarSummary, Link, LinksFile, SlotDescriptor};
use crate::path::{normalize_region, slot_path, SlotRef, SlotType, Vin};
use crate::remote::RemoteStore;

/// The surface exposed to the HTTP layer. One value per process,
/// constructed at startup with the store client and config injected.
pub struct PhotoService<S> {
    engine: Engine<S>,
}

impl<S: RemoteStore> PhotoService<S> {
    pub fn new(store: S, cfg: EngineConfig) -> Self {
        Self {
            engine: Engine::new(store, cfg),
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Normalize and authorize a region tag.
    fn check_region(&self, region: &str) -> Result<String> {
        let region = normalize_region(region);
        if region.is_empty() || !self.engine.config().region_allowed(&region) {
            return Err(DiskError::RegionDenied(region));
        }
        Ok(region)
    }

    /// Resolve a `(region, vin, slot)` triple to the slot directory.
    async fn resolve_slot(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
    ) -> Result<String> {
        let slot = SlotRef::new(slot_type, slot_index)?;
        let (car, _) = self.engine.open_car(region, vin).await?;
        let vin = Vin::parse(vin)?;
        Ok(slot_path(
            &car.root_path,
            slot,
            &car.meta.make,
            &car.meta.model,
            &vin,
        ))
    }

    pub async fn list_cars_by_region(&self, region: &str) -> Result<Vec<CarSummary>> {
        let region = self.check_region(region)?;
        self.engine.list_cars_by_region(&region).await
    }

    pub async fn get_car_with_slots(
        &self,
        region: &str,
        vin: &str,
    ) -> Result<(Car, Vec<SlotDescriptor>)> {
        let region = self.check_region(region)?;
        self.engine.open_car(&region, vin).await
    }

    pub async fn load_car_slot_counts(
        &self,
        region: &str,
        vin: &str,
    ) -> Result<Vec<SlotDescriptor>> {
        let region = self.check_region(region)?;
        self.engine.load_car_slot_counts(&region, vin).await
    }

    pub async fn create_car(
        &self,
        region: &str,
        make: &str,
        model: &str,
        vin: &str,
        created_by: &str,
    ) -> Result<Car> {
        let region = self.check_region(region)?;
        self.engine
            .create_car(&region, make, model, vin, created_by)
            .await
    }

    pub async fn archive_car(&self, region: &str, vin: &str, actor: &str) -> Result<String> {
        let region = self.check_region(region)?;
        self.engine.archive_car(&region, vin, actor).await
    }

    pub async fn restore_car(&self, vin: &str, target_region: &str, actor: &str) -> Result<Car> {
        let target_region = self.check_region(target_region)?;
        self.engine.restore_car(vin, &target_region, actor).await
    }

    /// Upload files into one slot. Per-request caps are checked here,
    /// before the engine's per-slot preflight.
    pub async fn upload_to_slot(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
        files: Vec<UploadFile>,
        actor: &str,
    ) -> Result<UploadOutcome> {
        let region = self.check_region(region)?;
        let cfg = self.engine.config();

        if files.len() > cfg.max_files_per_upload {
            return Err(DiskError::UploadCapExceeded(format!(
                "{} files exceeds the per-request cap of {}",
                files.len(),
                cfg.max_files_per_upload
            )));
        }
        if let Some(file) = files.iter().find(|f| f.size_mb() > cfg.max_file_size_mb) {
            return Err(DiskError::UploadCapExceeded(format!(
                "{} is {:.2} MB, over the per-file cap of {:.0} MB",
                file.name,
                file.size_mb(),
                cfg.max_file_size_mb
            )));
        }
        let total_mb: f64 = files.iter().map(UploadFile::size_mb).sum();
        if total_mb > cfg.max_total_upload_size_mb {
            return Err(DiskError::UploadCapExceeded(format!(
                "request totals {:.2} MB, over the cap of {:.0} MB",
                total_mb, cfg.max_total_upload_size_mb
            )));
        }

        let slot = self.resolve_slot(&region, vin, slot_type, slot_index).await?;
        self.engine.execute_write_pipeline(&slot, files, actor).await
    }

    pub async fn mark_slot_used(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
        actor: &str,
    ) -> Result<()> {
        let region = self.check_region(region)?;
        let slot = self.resolve_slot(&region, vin, slot_type, slot_index).await?;
        self.engine.mark_slot_used(&slot, actor).await
    }

    pub async fn mark_slot_unused(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
    ) -> Result<()> {
        let region = self.check_region(region)?;
        let slot = self.resolve_slot(&region, vin, slot_type, slot_index).await?;
        self.engine.mark_slot_unused(&slot).await
    }

    pub async fn publish_slot(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
        actor: &str,
    ) -> Result<String> {
        let region = self.check_region(region)?;
        let slot = self.resolve_slot(&region, vin, slot_type, slot_index).await?;
        self.engine.publish_slot(&slot, actor).await
    }

    pub async fn get_slot_download_url(
        &self,
        region: &str,
        vin: &str,
        slot_type: SlotType,
        slot_index: u8,
    ) -> Result<String> {
        let region = self.check_region(region)?;
        let slot = self.resolve_slot(&region, vin, slot_type, slot_index).await?;
        self.engine.slot_download_url(&slot).await
    }

    pub async fn list_links(&self, region: &str, vin: &str) -> Result<LinksFile> {
        let region = self.check_region(region)?;
        let (car, _) = self.engine.open_car(&region, vin).await?;
        self.engine.list_links(&car.root_path).await
    }

    pub async fn create_link(
        &self,
        region: &str,
        vin: &str,
        title: &str,
        url: &str,
        actor: &str,
    ) -> Result<Link> {
        let region = self.check_region(region)?;
        let (car, _) = self.engine.open_car(&region, vin).await?;
        self.engine.create_link(&car.root_path, title, url, actor).await
    }

    pub async fn delete_link(&self, region: &str, vin: &str, id: Uuid) -> Result<bool> {
        let region = self.check_region(region)?;
        let (car, _) = self.engine.open_car(&region, vin).await?;
        self.engine.delete_link(&car.root_path, id).await
    }

    /// Operator entry point.
    pub async fn reconcile(&self, path: &str, depth: ReconcileDepth) -> Result<ReconcileReport> {
        self.engine.reconcile(path, depth).await
    }
}
