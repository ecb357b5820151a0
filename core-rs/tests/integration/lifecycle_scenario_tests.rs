//! Car lifecycle scenarios: create, archive, restore

use std::sync::Arc;

use photodisk_core::{
    CarMeta, DiskError, EngineConfig, MemoryStore, PhotoService, RegionIndex, RemoteStore,
    SlotType, UploadFile,
};

const VIN: &str = "1HGBH41JXMN109186";

fn config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.regions = vec!["R1".to_string(), "R2".to_string()];
    cfg
}

fn service() -> PhotoService<Arc<MemoryStore>> {
    PhotoService::new(Arc::new(MemoryStore::new()), config())
}

async fn region_index(store: &MemoryStore, region: &str) -> Option<RegionIndex> {
    let value = store
        .get_json(&format!("/Фото/{}/_REGION.json", region))
        .await
        .unwrap()?;
    Some(serde_json::from_value(value).unwrap())
}

async fn car_meta(store: &MemoryStore, root: &str) -> Option<CarMeta> {
    let value = store.get_json(&format!("{}/_CAR.json", root)).await.unwrap()?;
    Some(serde_json::from_value(value).unwrap())
}

/// S4: creating a car produces exactly 14 slot directories, `_CAR.json`
/// and a region index entry.
#[tokio::test]
async fn test_create_car_produces_14_slots() {
    let svc = service();
    let car = svc
        .create_car("R1", "Toyota", "Camry", VIN, "u@x")
        .await
        .unwrap();

    assert_eq!(car.root_path, format!("/Фото/R1/Toyota Camry {}", VIN));

    let store = svc.engine().store();
    let mut slot_dirs = 0;
    for family in ["1. Dealer photos", "2. Buyout photos", "3. Dummy photos"] {
        let entries = store
            .list(&format!("{}/{}", car.root_path, family))
            .await
            .unwrap()
            .unwrap();
        slot_dirs += entries.iter().filter(|e| e.is_dir()).count();
    }
    assert_eq!(slot_dirs, 14);

    let meta = car_meta(store, &car.root_path).await.unwrap();
    assert_eq!(meta.vin, VIN);
    assert_eq!(meta.region, "R1");
    assert_eq!(meta.created_by.as_deref(), Some("u@x"));

    let index = region_index(store, "R1").await.unwrap();
    assert!(index.cars.iter().any(|c| c.vin == VIN));
}

#[tokio::test]
async fn test_create_duplicate_vin_rejected() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    let err = svc
        .create_car("R1", "Kia", "Rio", VIN, "u@x")
        .await
        .unwrap_err();
    assert!(matches!(err, DiskError::AlreadyExists(_)));
    assert_eq!(err.http_status(), 409);
}

#[tokio::test]
async fn test_create_rejects_bad_vin_and_archive_region() {
    let svc = service();

    let err = svc.create_car("R1", "Toyota", "Camry", "SHORT", "u@x").await.unwrap_err();
    assert!(matches!(err, DiskError::VinInvalid(_)));

    let err = svc.create_car("ALL", "Toyota", "Camry", VIN, "u@x").await.unwrap_err();
    assert!(matches!(err, DiskError::RegionDenied(_)));
}

/// S5: archive then restore, checking region indexes, folder naming and
/// metadata at each hop.
#[tokio::test]
async fn test_archive_restore_round_trip() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    svc.upload_to_slot(
        "R1",
        VIN,
        SlotType::Dealer,
        1,
        vec![UploadFile::new("keeper.jpg", vec![7; 256], "image/jpeg")],
        "u@x",
    )
    .await
    .unwrap();

    let archived_path = svc.archive_car("R1", VIN, "admin@x").await.unwrap();
    assert_eq!(
        archived_path,
        format!("/Фото/ALL/R1_Toyota_Camry_{}", VIN)
    );

    let store = svc.engine().store();

    // Gone from R1, present in ALL.
    let r1 = region_index(store, "R1").await.unwrap();
    assert!(!r1.cars.iter().any(|c| c.vin == VIN));
    let all = region_index(store, "ALL").await.unwrap();
    assert!(all.cars.iter().any(|c| c.vin == VIN));

    let meta = car_meta(store, &archived_path).await.unwrap();
    assert_eq!(meta.region, "ALL");
    assert_eq!(meta.original_region.as_deref(), Some("R1"));
    assert!(meta.archived_at.is_some());
    assert_eq!(meta.archived_by.as_deref(), Some("admin@x"));

    // The photo moved with the car.
    let slot_in_archive = format!(
        "{}/1. Dealer photos/Toyota Camry {}/keeper.jpg",
        archived_path, VIN
    );
    assert!(store.exists(&slot_in_archive).await.unwrap());

    // Restore into a different region.
    let car = svc.restore_car(VIN, "R2", "admin@x").await.unwrap();
    assert_eq!(car.root_path, format!("/Фото/R2/Toyota Camry {}", VIN));

    let all = region_index(store, "ALL").await.unwrap();
    assert!(!all.cars.iter().any(|c| c.vin == VIN));
    let r2 = region_index(store, "R2").await.unwrap();
    assert!(r2.cars.iter().any(|c| c.vin == VIN));

    let meta = car_meta(store, &car.root_path).await.unwrap();
    assert_eq!(meta.region, "R2");
    assert!(meta.restored_at.is_some());
    assert!(meta.original_region.is_none());

    let restored_photo = format!(
        "{}/1. Dealer photos/Toyota Camry {}/keeper.jpg",
        car.root_path, VIN
    );
    assert!(store.exists(&restored_photo).await.unwrap());
}

#[tokio::test]
async fn test_restore_into_occupied_region_rejected() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    svc.archive_car("R1", VIN, "admin@x").await.unwrap();

    // Same VIN appears in R2 while the original sits in the archive.
    svc.create_car("R2", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    let err = svc.restore_car(VIN, "R2", "admin@x").await.unwrap_err();
    assert!(matches!(err, DiskError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_restore_to_archive_region_rejected() {
    let svc = service();
    let err = svc.restore_car(VIN, "ALL", "admin@x").await.unwrap_err();
    assert!(matches!(err, DiskError::RegionDenied(_)));
}

#[tokio::test]
async fn test_archive_missing_car_is_not_found() {
    let svc = service();
    let err = svc.archive_car("R1", VIN, "admin@x").await.unwrap_err();
    assert!(matches!(err, DiskError::CarNotFound { .. }));
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_links_crud() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    let link = svc
        .create_link("R1", VIN, "Inspection report", "https://example.com/r", "u@x")
        .await
        .unwrap();

    let links = svc.list_links("R1", VIN).await.unwrap();
    assert_eq!(links.links.len(), 1);
    assert_eq!(links.links[0].title, "Inspection report");

    assert!(svc.delete_link("R1", VIN, link.id).await.unwrap());
    assert!(!svc.delete_link("R1", VIN, link.id).await.unwrap());
    assert!(svc.list_links("R1", VIN).await.unwrap().links.is_empty());
}

#[tokio::test]
async fn test_find_link_scans_regions() {
    let svc = service();
    svc.create_car("R2", "Kia", "Rio", VIN, "u@x").await.unwrap();
    let link = svc
        .create_link("R2", VIN, "Invoice", "https://example.com/i", "u@x")
        .await
        .unwrap();

    let found = svc.engine().find_link(link.id).await.unwrap();
    let (root, hit) = found.expect("link found somewhere");
    assert!(root.contains("/R2/"));
    assert_eq!(hit.id, link.id);

    let missing = svc.engine().find_link(uuid::Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_used_marker_and_publish() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    svc.mark_slot_used("R1", VIN, SlotType::Buyout, 2, "admin@x").await.unwrap();
    let slots = svc.load_car_slot_counts("R1", VIN).await.unwrap();
    let buyout2 = slots
        .iter()
        .find(|s| s.slot.index == 2 && s.slot.slot_type == SlotType::Buyout)
        .unwrap();
    assert!(buyout2.used);

    svc.mark_slot_unused("R1", VIN, SlotType::Buyout, 2).await.unwrap();
    let slots = svc.load_car_slot_counts("R1", VIN).await.unwrap();
    let buyout2 = slots
        .iter()
        .find(|s| s.slot.index == 2 && s.slot.slot_type == SlotType::Buyout)
        .unwrap();
    assert!(!buyout2.used);

    let url = svc.publish_slot("R1", VIN, SlotType::Dealer, 1, "admin@x").await.unwrap();
    assert!(url.starts_with("https://"));
    // Second call serves the cached URL.
    let again = svc.publish_slot("R1", VIN, SlotType::Dealer, 1, "admin@x").await.unwrap();
    assert_eq!(url, again);

    let download = svc
        .get_slot_download_url("R1", VIN, SlotType::Dealer, 1)
        .await
        .unwrap();
    assert!(download.contains("download"));
}
