// Index contracts
//
// Derived indexes always agree with themselves (count/cover), with the
// directory listing after a reconcile, and reconcile is idempotent on
// the stored bytes.

use std::sync::Arc;

use photodisk_core::{
    EngineConfig, MemoryStore, PhotoIndex, PhotoService, ReconcileDepth, RegionIndex, RemoteStore,
    SlotType, UploadFile,
};

const VIN: &str = "1HGBH41JXMN109186";
const VIN2: &str = "2FMDK3GC4ABA12345";

fn service() -> PhotoService<Arc<MemoryStore>> {
    let mut cfg = EngineConfig::default();
    cfg.regions = vec!["R1".to_string()];
    PhotoService::new(Arc::new(MemoryStore::new()), cfg)
}

fn dealer_slot() -> String {
    format!(
        "/Фото/R1/Toyota Camry {vin}/1. Dealer photos/Toyota Camry {vin}",
        vin = VIN
    )
}

async fn stored_photos(store: &MemoryStore, slot: &str) -> Option<serde_json::Value> {
    store.get_json(&format!("{}/_PHOTOS.json", slot)).await.unwrap()
}

/// Invariant 1: count == len(items), cover == items[0].name or null.
#[tokio::test]
async fn contract_photo_index_internal_agreement() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    // Empty slot.
    svc.reconcile(&dealer_slot(), ReconcileDepth::Slot).await.unwrap();
    let value = stored_photos(svc.engine().store(), &dealer_slot()).await.unwrap();
    let index: PhotoIndex = serde_json::from_value(value).unwrap();
    assert_eq!(index.count, index.items.len());
    assert!(index.cover.is_none());

    // After uploads.
    svc.upload_to_slot(
        "R1",
        VIN,
        SlotType::Dealer,
        1,
        vec![
            UploadFile::new("b.jpg", vec![1; 10], "image/jpeg"),
            UploadFile::new("a.jpg", vec![1; 10], "image/jpeg"),
        ],
        "u@x",
    )
    .await
    .unwrap();
    let value = stored_photos(svc.engine().store(), &dealer_slot()).await.unwrap();
    let index: PhotoIndex = serde_json::from_value(value).unwrap();
    assert_eq!(index.count, index.items.len());
    assert_eq!(index.cover.as_deref(), Some(index.items[0].name.as_str()));
}

/// Invariant 2: after reconcileSlot, items == non-sidecar files in the
/// directory.
#[tokio::test]
async fn contract_reconciled_items_match_listing() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    let slot = dealer_slot();
    let store = svc.engine().store();

    for name in ["x.jpg", "y.png", "z.webp"] {
        store
            .put_bytes(&format!("{}/{}", slot, name), vec![1; 10], "image/jpeg")
            .await
            .unwrap();
    }
    svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();

    let value = stored_photos(store, &slot).await.unwrap();
    let index: PhotoIndex = serde_json::from_value(value).unwrap();
    let mut indexed: Vec<String> = index.items.iter().map(|i| i.name.clone()).collect();
    indexed.sort();

    let mut on_disk: Vec<String> = store
        .list(&slot)
        .await
        .unwrap()
        .unwrap()
        .into_iter()
        .filter(|e| e.is_file() && !e.name.starts_with('_'))
        .map(|e| e.name)
        .collect();
    on_disk.sort();

    assert_eq!(indexed, on_disk);
}

/// Invariant 3: after reconcileRegion, the VIN set equals the parseable
/// car folders.
#[tokio::test]
async fn contract_region_index_matches_folders() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    svc.create_car("R1", "Kia", "Rio", VIN2, "u@x").await.unwrap();
    let store = svc.engine().store();

    store.ensure_dir("/Фото/R1/not a car").await.unwrap();
    svc.reconcile("R1", ReconcileDepth::Region).await.unwrap();

    let value = store.get_json("/Фото/R1/_REGION.json").await.unwrap().unwrap();
    let index: RegionIndex = serde_json::from_value(value).unwrap();
    let mut vins: Vec<&str> = index.cars.iter().map(|c| c.vin.as_str()).collect();
    vins.sort();
    assert_eq!(vins, vec![VIN, VIN2]);
}

/// Invariant 7: a second reconcile with no external changes leaves the
/// stored bytes untouched.
#[tokio::test]
async fn contract_reconcile_idempotent() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    let slot = dealer_slot();
    let store = svc.engine().store();

    store.put_bytes(&format!("{}/a.jpg", slot), vec![1; 10], "image/jpeg").await.unwrap();

    svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();
    let first = stored_photos(store, &slot).await.unwrap();

    let report = svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();
    let second = stored_photos(store, &slot).await.unwrap();

    assert_eq!(first, second);
    assert!(report.repaired_files.is_empty(), "second run rewrote files");

    // Region depth behaves the same.
    svc.reconcile("R1", ReconcileDepth::Region).await.unwrap();
    let first = store.get_json("/Фото/R1/_REGION.json").await.unwrap().unwrap();
    let report = svc.reconcile("R1", ReconcileDepth::Region).await.unwrap();
    let second = store.get_json("/Фото/R1/_REGION.json").await.unwrap().unwrap();
    assert_eq!(first, second);
    assert!(report.repaired_files.is_empty());
}

/// The slot summary is always derived from the photo index, never
/// written independently.
#[tokio::test]
async fn contract_slot_stats_track_photo_index() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    svc.upload_to_slot(
        "R1",
        VIN,
        SlotType::Dealer,
        1,
        vec![UploadFile::new("a.jpg", vec![1; 1024 * 1024], "image/jpeg")],
        "u@x",
    )
    .await
    .unwrap();

    let store = svc.engine().store();
    let slot = dealer_slot();
    let photos: PhotoIndex =
        serde_json::from_value(stored_photos(store, &slot).await.unwrap()).unwrap();
    let stats = store.get_json(&format!("{}/_SLOT.json", slot)).await.unwrap().unwrap();

    assert_eq!(stats["count"], photos.count as u64);
    assert_eq!(stats["cover"], serde_json::json!(photos.cover));
}
