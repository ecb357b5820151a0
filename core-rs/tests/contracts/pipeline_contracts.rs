// Write pipeline contracts
//
// Uploads are durable-or-marked (invariant 4), concurrent writers never
// lose each other's files (invariant 5), and preflight rejections stop
// short of the upload endpoint (invariant 9).

use std::sync::Arc;
use std::time::Duration;

use photodisk_core::{
    DiskError, EngineConfig, MemoryStore, PhotoIndex, PhotoService, ReconcileDepth, RemoteStore,
    SlotType, UploadFile,
};

const VIN: &str = "1HGBH41JXMN109186";

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

fn jpeg(name: &str) -> UploadFile {
    UploadFile::new(name, vec![0xCD; 256], "image/jpeg")
}

async fn index_names(store: &MemoryStore, slot: &str) -> Vec<String> {
    let value = store
        .get_json(&format!("{}/_PHOTOS.json", slot))
        .await
        .unwrap()
        .expect("photo index present");
    let index: PhotoIndex = serde_json::from_value(value).unwrap();
    index.items.into_iter().map(|i| i.name).collect()
}

/// Invariant 4, happy path: a successful upload's names are in the
/// index on the next read.
#[tokio::test]
async fn contract_successful_upload_lands_in_index() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    svc.upload_to_slot(
        "R1",
        VIN,
        SlotType::Dealer,
        1,
        vec![jpeg("f1.jpg"), jpeg("f2.jpg")],
        "u@x",
    )
    .await
    .unwrap();

    let names = index_names(svc.engine().store(), &dealer_slot()).await;
    assert!(names.contains(&"f1.jpg".to_string()));
    assert!(names.contains(&"f2.jpg".to_string()));
}

/// Invariant 4, failure path: when the index write dies after the bytes
/// landed, a dirty marker survives and reconcile recovers the files.
#[tokio::test]
async fn contract_failed_index_write_leaves_dirty_marker() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    let slot = dealer_slot();
    let store = svc.engine().store();

    // Pre-build a valid index so preflight does not write, then break
    // the next _PHOTOS.json write (the stage-C merge).
    svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();
    store.inject_put_failure("_PHOTOS.json", 1);

    let err = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("f.jpg")], "u@x")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("commitIndex_error"));

    // Bytes are on the store, the marker records the disagreement, the
    // lock is gone.
    assert!(store.exists(&format!("{}/f.jpg", slot)).await.unwrap());
    assert!(store.exists(&format!("{}/_DIRTY.json", slot)).await.unwrap());
    assert!(!store.exists(&format!("{}/_LOCK.json", slot)).await.unwrap());

    // Reconcile heals: the file is indexed, the marker consumed.
    svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();
    let names = index_names(store, &slot).await;
    assert!(names.contains(&"f.jpg".to_string()));
    assert!(!store.exists(&format!("{}/_DIRTY.json", slot)).await.unwrap());
}

async fn upload_until_success(svc: &PhotoService<Arc<MemoryStore>>, name: &str) {
    for _ in 0..100 {
        match svc
            .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg(name)], "u@x")
            .await
        {
            Ok(_) => return,
            Err(DiskError::LockHeld { .. }) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    panic!("upload of {} never succeeded", name);
}

/// Invariant 5: concurrent writers with disjoint names both land; no
/// lost writes across the lock boundary.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contract_concurrent_disjoint_uploads_union() {
    let svc = Arc::new(service());
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            upload_until_success(&svc, &format!("w{}.jpg", i)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let names = index_names(svc.engine().store(), &dealer_slot()).await;
    for i in 0..4 {
        assert!(
            names.contains(&format!("w{}.jpg", i)),
            "w{}.jpg lost; index: {:?}",
            i,
            names
        );
    }
    assert_eq!(names.len(), 4);
}

/// Invariant 9: a preflight rejection never reaches the upload-URL
/// endpoint.
#[tokio::test]
async fn contract_preflight_rejection_stops_before_upload() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    let slot = dealer_slot();
    let store = svc.engine().store();

    for i in 0..40 {
        store
            .put_bytes(&format!("{}/seed{:02}.jpg", slot, i), vec![1; 16], "image/jpeg")
            .await
            .unwrap();
    }
    svc.reconcile(&slot, ReconcileDepth::Slot).await.unwrap();

    let before = store.upload_url_requests();
    let err = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("extra.jpg")], "u@x")
        .await
        .unwrap_err();
    assert!(matches!(err, DiskError::PhotoLimitExceeded { .. }));
    assert_eq!(store.upload_url_requests(), before);

    // Size rejection behaves identically.
    let svc2 = service();
    svc2.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    svc2.reconcile(&dealer_slot(), ReconcileDepth::Slot).await.unwrap();
    let store2 = svc2.engine().store();
    let before = store2.upload_url_requests();
    let huge = UploadFile::new("huge.jpg", vec![0u8; 9 * 1024 * 1024], "image/jpeg");
    let also_huge = UploadFile::new("huge2.jpg", vec![0u8; 9 * 1024 * 1024], "image/jpeg");
    let third = UploadFile::new("huge3.jpg", vec![0u8; 9 * 1024 * 1024], "image/jpeg");
    let err = svc2
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![huge, also_huge, third], "u@x")
        .await
        .unwrap_err();
    assert!(matches!(err, DiskError::SlotSizeExceeded { .. }));
    assert_eq!(store2.upload_url_requests(), before);
}

/// The lock is released on the success path and on merge failure; only
/// a crash leaves it for the TTL to clean up.
#[tokio::test]
async fn contract_lock_released_on_all_exits() {
    let svc = service();
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    let slot = dealer_slot();
    let store = svc.engine().store();
    let lock_path = format!("{}/_LOCK.json", slot);

    svc.upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("ok.jpg")], "u@x")
        .await
        .unwrap();
    assert!(!store.exists(&lock_path).await.unwrap());

    store.inject_put_failure("_PHOTOS.json", 1);
    svc.upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("fail.jpg")], "u@x")
        .await
        .unwrap_err();
    assert!(!store.exists(&lock_path).await.unwrap());
}
