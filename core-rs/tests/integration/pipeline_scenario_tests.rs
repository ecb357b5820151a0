//! End-to-end write pipeline scenarios against the in-memory store
//!
//! Covers limit rejection before upload, concurrent merge, rollback on
//! commit-data failure, and lock behavior.

use std::sync::Arc;
use std::time::Duration;

use photodisk_core::{
    DiskError, EngineConfig, LockFile, MemoryStore, PhotoIndex, PhotoService, SlotType,
    UploadFile, UploadOutcome,
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

fn dealer_slot_path() -> String {
    format!(
        "/Фото/R1/Toyota Camry {vin}/1. Dealer photos/Toyota Camry {vin}",
        vin = VIN
    )
}

async fn seed_car(svc: &PhotoService<Arc<MemoryStore>>) {
    svc.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
}

fn jpeg(name: &str, size: usize) -> UploadFile {
    UploadFile::new(name, vec![0xAB; size], "image/jpeg")
}

async fn read_index(store: &MemoryStore, slot: &str) -> Option<PhotoIndex> {
    use photodisk_core::RemoteStore;
    let value = store.get_json(&format!("{}/_PHOTOS.json", slot)).await.unwrap()?;
    Some(serde_json::from_value(value).unwrap())
}

#[tokio::test]
async fn test_upload_happy_path() {
    let svc = service();
    seed_car(&svc).await;

    let outcome = svc
        .upload_to_slot(
            "R1",
            VIN,
            SlotType::Dealer,
            1,
            vec![jpeg("a.jpg", 1024), jpeg("b.jpg", 2048)],
            "u@x",
        )
        .await
        .unwrap();

    assert_eq!(outcome.uploaded, vec!["a.jpg", "b.jpg"]);
    assert_eq!(outcome.count, 2);
    assert!(outcome.verified);
    assert!(!outcome.dirty);

    let index = read_index(svc.engine().store(), &dealer_slot_path()).await.unwrap();
    assert_eq!(index.count, 2);
    assert_eq!(index.cover.as_deref(), Some("a.jpg"));

    // The lock was released.
    use photodisk_core::RemoteStore;
    let lock = svc
        .engine()
        .store()
        .exists(&format!("{}/_LOCK.json", dealer_slot_path()))
        .await
        .unwrap();
    assert!(!lock);
}

/// S1: a full slot rejects one more file before any upload URL is
/// requested.
#[tokio::test]
async fn test_limit_rejected_before_upload() {
    use photodisk_core::RemoteStore;

    let svc = service();
    seed_car(&svc).await;
    let slot = dealer_slot_path();

    // 40 photos on disk, indexed.
    for i in 0..40 {
        svc.engine()
            .store()
            .put_bytes(&format!("{}/p{:02}.jpg", slot, i), vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
    }
    svc.engine()
        .reconcile(&slot, photodisk_core::ReconcileDepth::Slot)
        .await
        .unwrap();

    let urls_before = svc.engine().store().upload_url_requests();
    let listing_before = svc.engine().store().list(&slot).await.unwrap().unwrap().len();

    let err = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("one-more.jpg", 10 * 1024)], "u@x")
        .await
        .unwrap_err();

    match err {
        DiskError::PhotoLimitExceeded {
            current_count,
            adding,
            max_photos,
        } => {
            assert_eq!(current_count, 40);
            assert_eq!(adding, 1);
            assert_eq!(max_photos, 40);
        }
        other => panic!("expected PhotoLimitExceeded, got {:?}", other),
    }

    // No bytes left the client: the upload endpoint was never touched
    // and the directory is unchanged.
    assert_eq!(svc.engine().store().upload_url_requests(), urls_before);
    let listing_after = svc.engine().store().list(&slot).await.unwrap().unwrap().len();
    assert_eq!(listing_after, listing_before);
}

#[tokio::test]
async fn test_slot_size_rejected_in_preflight() {
    let svc = service();
    seed_car(&svc).await;

    // Two 9 MB files fit under the 20 MB cap only once.
    svc.upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("a.jpg", 9 * 1024 * 1024)], "u@x")
        .await
        .unwrap();
    svc.upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("b.jpg", 9 * 1024 * 1024)], "u@x")
        .await
        .unwrap();

    let err = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("c.jpg", 9 * 1024 * 1024)], "u@x")
        .await
        .unwrap_err();
    assert!(matches!(err, DiskError::SlotSizeExceeded { .. }));
    assert_eq!(err.http_status(), 413);
}

async fn upload_retrying(
    svc: &PhotoService<Arc<MemoryStore>>,
    name: &str,
) -> UploadOutcome {
    for _ in 0..100 {
        match svc
            .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg(name, 512)], "u@x")
            .await
        {
            Ok(outcome) => return outcome,
            Err(DiskError::LockHeld { .. }) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(other) => panic!("unexpected error for {}: {:?}", name, other),
        }
    }
    panic!("lock never became available for {}", name)
}

/// S2: two concurrent uploads with disjoint names both succeed and both
/// names land in the index.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_uploads_merge() {
    let svc = Arc::new(service());
    seed_car(&svc).await;

    let a = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { upload_retrying(&svc, "a.jpg").await })
    };
    let b = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { upload_retrying(&svc, "b.jpg").await })
    };
    a.await.unwrap();
    b.await.unwrap();

    let index = read_index(svc.engine().store(), &dealer_slot_path()).await.unwrap();
    let mut names: Vec<String> = index.items.iter().map(|i| i.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    assert_eq!(index.count, 2);
}

/// S3: an externally deleted index is rebuilt by the next reader. A
/// second service instance models the fresh-cache replica that serves
/// that read.
#[tokio::test]
async fn test_index_deletion_heals_on_read() {
    use photodisk_core::RemoteStore;

    let store = Arc::new(MemoryStore::new());
    let writer = PhotoService::new(Arc::clone(&store), config());
    writer.create_car("R1", "Toyota", "Camry", VIN, "u@x").await.unwrap();
    writer
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("x.jpg", 1024)], "u@x")
        .await
        .unwrap();

    let slot = dealer_slot_path();
    store.delete(&format!("{}/_PHOTOS.json", slot)).await.unwrap();
    assert!(read_index(&store, &slot).await.is_none());

    let reader = PhotoService::new(Arc::clone(&store), config());
    let slots = reader.load_car_slot_counts("R1", VIN).await.unwrap();
    let dealer = &slots[0];
    assert_eq!(dealer.count, 1);
    assert_eq!(dealer.cover.as_deref(), Some("x.jpg"));

    let index = read_index(&store, &slot).await.expect("index rebuilt on store");
    assert_eq!(index.items.len(), 1);
    assert_eq!(index.items[0].name, "x.jpg");
}

#[tokio::test]
async fn test_commit_data_failure_rolls_back() {
    use photodisk_core::RemoteStore;

    let svc = service();
    seed_car(&svc).await;
    let slot = dealer_slot_path();

    svc.engine().store().inject_put_failure("b.jpg", 1);

    let err = svc
        .upload_to_slot(
            "R1",
            VIN,
            SlotType::Dealer,
            1,
            vec![jpeg("a.jpg", 512), jpeg("b.jpg", 512)],
            "u@x",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("commitData_error"));

    // a.jpg went up first and was rolled back.
    assert!(!svc.engine().store().exists(&format!("{}/a.jpg", slot)).await.unwrap());
    assert!(!svc.engine().store().exists(&format!("{}/b.jpg", slot)).await.unwrap());
}

#[tokio::test]
async fn test_held_lock_refuses_second_writer() {
    use chrono::Utc;
    use photodisk_core::RemoteStore;

    let svc = service();
    seed_car(&svc).await;
    let slot = dealer_slot_path();

    let lock = LockFile::new("other@x", "upload", &slot, Duration::from_secs(300), Utc::now());
    svc.engine()
        .store()
        .put_json(&format!("{}/_LOCK.json", slot), &serde_json::to_value(&lock).unwrap())
        .await
        .unwrap();

    let err = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("a.jpg", 512)], "u@x")
        .await
        .unwrap_err();
    match err {
        DiskError::LockHeld { holder, .. } => assert_eq!(holder, "other@x"),
        other => panic!("expected LockHeld, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_lock_is_reacquired() {
    use chrono::{Duration as ChronoDuration, Utc};
    use photodisk_core::RemoteStore;

    let svc = service();
    seed_car(&svc).await;
    let slot = dealer_slot_path();

    let stale = LockFile::new(
        "crashed@x",
        "upload",
        &slot,
        Duration::from_secs(300),
        Utc::now() - ChronoDuration::minutes(10),
    );
    svc.engine()
        .store()
        .put_json(&format!("{}/_LOCK.json", slot), &serde_json::to_value(&stale).unwrap())
        .await
        .unwrap();

    let outcome = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("a.jpg", 512)], "u@x")
        .await
        .unwrap();
    assert_eq!(outcome.count, 1);

    // The dead writer's lock is gone.
    assert!(!svc
        .engine()
        .store()
        .exists(&format!("{}/_LOCK.json", slot))
        .await
        .unwrap());
}

/// The CLI path: bytes come off the local filesystem and the browser
/// filename gets sanitized on the way in.
#[tokio::test]
async fn test_upload_from_local_files() {
    let svc = service();
    seed_car(&svc).await;

    let dir = tempfile::tempdir().unwrap();
    let on_disk = dir.path().join("front left.jpg");
    std::fs::write(&on_disk, vec![0x11u8; 4096]).unwrap();

    let bytes = std::fs::read(&on_disk).unwrap();
    let outcome = svc
        .upload_to_slot(
            "R1",
            VIN,
            SlotType::Dealer,
            1,
            vec![UploadFile::new("front left.jpg", bytes, "image/jpeg")],
            "u@x",
        )
        .await
        .unwrap();
    assert_eq!(outcome.uploaded, vec!["front left.jpg"]);

    let index = read_index(svc.engine().store(), &dealer_slot_path()).await.unwrap();
    assert_eq!(index.items[0].size, 4096);
}

#[tokio::test]
async fn test_duplicate_name_merges_once() {
    let svc = service();
    seed_car(&svc).await;

    svc.upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("a.jpg", 512)], "u@x")
        .await
        .unwrap();
    let outcome = svc
        .upload_to_slot("R1", VIN, SlotType::Dealer, 1, vec![jpeg("a.jpg", 2048)], "u@x")
        .await
        .unwrap();

    // Later writer wins the bytes; the index still lists the name once.
    assert_eq!(outcome.count, 1);
    let index = read_index(svc.engine().store(), &dealer_slot_path()).await.unwrap();
    assert_eq!(index.items.len(), 1);
    assert_eq!(index.items[0].size, 2048);
}
