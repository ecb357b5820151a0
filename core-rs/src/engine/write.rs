//! Four-stage write pipeline: Preflight → CommitData → CommitIndex →
//! Verify
//!
//! Stage A rejects over-limit requests before any upload URL is
//! requested. Stage B uploads the bytes and rolls back on terminal
//! failure. Stage C merges the index under the slot lock; releasing the
//! lock is the finalizer of the stage. Stage D re-reads the index and
//! downgrades any disagreement to a dirty marker — it never fails the
//! operation.

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{DiskError, Result};
use crate::model::{
    DirtyMarker, LockFile, PhotoIndex, PhotoItem, SlotStats, DIRTY_FILE, LOCK_FILE, PHOTOS_FILE,
    SLOT_FILE,
};
use crate::path::{assert_disk_path, join, sanitize_filename};
use crate::remote::RemoteStore;

use super::{now, Engine};

const MIB: f64 = 1024.0 * 1024.0;

/// One incoming file. The name is sanitized at construction; callers
/// hand over whatever the browser sent.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl UploadFile {
    pub fn new(name: &str, bytes: Vec<u8>, content_type: &str) -> Self {
        Self {
            name: sanitize_filename(name),
            bytes,
            content_type: content_type.to_string(),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / MIB
    }
}

/// What a successful pipeline run did.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub slot_path: String,
    pub uploaded: Vec<String>,
    /// Post-merge item count of the slot.
    pub count: usize,
    pub total_size_mb: f64,
    /// False when the verify stage found a disagreement (and left a
    /// dirty marker for reconcile).
    pub verified: bool,
    pub dirty: bool,
}

/// Rewrite the stage tag on adapter errors so callers see which
/// pipeline stage failed.
fn stage_tagged(err: DiskError, stage: &str) -> DiskError {
    match err {
        DiskError::RemoteTransient { path, detail, .. } => DiskError::RemoteTransient {
            stage: stage.to_string(),
            path,
            detail,
        },
        DiskError::RemotePermanent { path, detail, .. } => DiskError::RemotePermanent {
            stage: stage.to_string(),
            path,
            detail,
        },
        other => other,
    }
}

impl<S: RemoteStore> Engine<S> {
    /// Run the full pipeline for one slot.
    pub async fn execute_write_pipeline(
        &self,
        slot_path: &str,
        files: Vec<UploadFile>,
        uploaded_by: &str,
    ) -> Result<UploadOutcome> {
        // ---- Stage A: preflight ----
        let slot_path = assert_disk_path(slot_path, "uploadToSlot")?;
        self.store().ensure_dir(&slot_path).await?;

        let current = self.photo_index_or_rebuild(&slot_path).await?;
        let adding_mb: f64 = files.iter().map(UploadFile::size_mb).sum();
        let current_mb = current.total_size_mb();
        let cfg = self.config();

        if current.count + files.len() > cfg.max_photos_per_slot {
            return Err(DiskError::PhotoLimitExceeded {
                current_count: current.count,
                adding: files.len(),
                max_photos: cfg.max_photos_per_slot,
            });
        }
        if current_mb + adding_mb > cfg.max_slot_size_mb {
            return Err(DiskError::SlotSizeExceeded {
                current_mb,
                adding_mb,
                max_mb: cfg.max_slot_size_mb,
            });
        }
        if cfg.debug_write_pipeline {
            debug!(
                target: "write_pipeline",
                slot = %slot_path,
                incoming = files.len(),
                current = current.count,
                "preflight passed"
            );
        }
        if files.is_empty() {
            let stats = SlotStats::derive(&current);
            return Ok(UploadOutcome {
                slot_path,
                uploaded: Vec::new(),
                count: stats.count,
                total_size_mb: stats.total_size_mb,
                verified: true,
                dirty: false,
            });
        }

        // ---- Stage B: commit data ----
        let mut uploaded: Vec<String> = Vec::new();
        for file in &files {
            let target = join(&slot_path, &file.name);
            match self
                .store()
                .put_bytes(&target, file.bytes.clone(), &file.content_type)
                .await
            {
                Ok(()) => uploaded.push(file.name.clone()),
                Err(e) => {
                    // Best-effort rollback of everything this pipeline
                    // put on the store.
                    for name in &uploaded {
                        let _ = self.store().delete(&join(&slot_path, name)).await;
                    }
                    if cfg.debug_write_pipeline {
                        debug!(
                            target: "write_pipeline",
                            slot = %slot_path,
                            failed = %file.name,
                            rolled_back = uploaded.len(),
                            "commit data failed"
                        );
                    }
                    return Err(stage_tagged(e, "commitData_error"));
                }
            }
        }

        // ---- Stage C: commit index under the slot lock ----
        let lock_path = join(&slot_path, LOCK_FILE);
        self.acquire_slot_lock(&slot_path, &lock_path, uploaded_by)
            .await?;
        let merge_result = self.merge_index(&slot_path, &files).await;
        // Releasing the lock is the finalizer of this stage; it runs
        // before the merge outcome is inspected. If the release itself
        // fails, the TTL bounds the orphan.
        if let Err(release_err) = self.store().delete(&lock_path).await {
            warn!(slot = %slot_path, error = %release_err, "lock release failed; TTL will expire it");
        }
        let merged = match merge_result {
            Ok(index) => index,
            Err(e) => {
                // The bytes are on the store but the index is not; leave
                // a trail for reconcile.
                let marker = DirtyMarker::new("commit index failed", &slot_path, now());
                if let Ok(value) = serde_json::to_value(&marker) {
                    let _ = self.store().put_json(&join(&slot_path, DIRTY_FILE), &value).await;
                }
                return Err(stage_tagged(e, "commitIndex_error"));
            }
        };

        // ---- Stage D: verify (never fails the operation) ----
        let (verified, dirty) = self.verify_slot(&slot_path, &files).await;
        if cfg.debug_write_pipeline {
            debug!(
                target: "write_pipeline",
                slot = %slot_path,
                uploaded = uploaded.len(),
                count = merged.count,
                verified,
                "pipeline complete"
            );
        }

        let stats = SlotStats::derive(&merged);
        Ok(UploadOutcome {
            slot_path,
            uploaded,
            count: stats.count,
            total_size_mb: stats.total_size_mb,
            verified,
            dirty,
        })
    }

    /// Acquire `_LOCK.json` for this slot.
    ///
    /// The store offers no create-exclusive, so after writing our record
    /// we read it back; if another writer's record came back instead,
    /// they won the slot and we yield `LockHeld`. An expired or
    /// unparseable lock is overwritten.
    async fn acquire_slot_lock(
        &self,
        slot_path: &str,
        lock_path: &str,
        locked_by: &str,
    ) -> Result<LockFile> {
        let ts = now();

        match self.store().get_json(lock_path).await {
            Ok(Some(v)) => {
                if let Ok(existing) = serde_json::from_value::<LockFile>(v) {
                    if !existing.is_expired(ts) {
                        return Err(DiskError::LockHeld {
                            holder: existing.locked_by,
                            expires_at: existing.expires_at,
                        });
                    }
                }
            }
            Ok(None) => {}
            Err(DiskError::IndexCorrupt { .. }) => {}
            Err(e) => return Err(e),
        }

        let ours = LockFile::new(locked_by, "upload", slot_path, self.config().lock_ttl(), ts);
        self.store()
            .put_json(lock_path, &serde_json::to_value(&ours)?)
            .await?;

        match self.store().get_json(lock_path).await {
            Ok(Some(v)) => match serde_json::from_value::<LockFile>(v) {
                Ok(current) if current.same_acquisition(&ours) => Ok(ours),
                Ok(current) => Err(DiskError::LockHeld {
                    holder: current.locked_by,
                    expires_at: current.expires_at,
                }),
                Err(_) => Err(DiskError::LockHeld {
                    holder: "unknown".to_string(),
                    expires_at: ours.expires_at,
                }),
            },
            Ok(None) => Err(DiskError::LockHeld {
                holder: "unknown".to_string(),
                expires_at: ours.expires_at,
            }),
            Err(DiskError::IndexCorrupt { .. }) => Err(DiskError::LockHeld {
                holder: "unknown".to_string(),
                expires_at: ours.expires_at,
            }),
            Err(e) => Err(e),
        }
    }

    /// Re-read the index and merge the incoming names in, de-duplicating
    /// by name and preserving insertion order. Writes `_PHOTOS.json` and
    /// the derived `_SLOT.json`, repopulating the cache so the caller's
    /// next read bypasses the TTL.
    async fn merge_index(&self, slot_path: &str, files: &[UploadFile]) -> Result<PhotoIndex> {
        let ts = now();
        let current = self.photo_index_or_rebuild(slot_path).await?;

        let mut items = current.items;
        for file in files {
            match items.iter_mut().find(|i| i.name == file.name) {
                // Name collision: stage B already overwrote the bytes,
                // so the entry tracks the new payload.
                Some(existing) => {
                    existing.size = file.bytes.len() as u64;
                    existing.modified = ts;
                }
                None => items.push(PhotoItem {
                    name: file.name.clone(),
                    size: file.bytes.len() as u64,
                    modified: ts,
                }),
            }
        }

        let index = PhotoIndex::build(items, self.config().max_photos_per_slot, ts);
        let photos_path = join(slot_path, PHOTOS_FILE);
        self.store()
            .put_json(&photos_path, &serde_json::to_value(&index)?)
            .await?;

        let stats = SlotStats::derive(&index);
        let slot_file = join(slot_path, SLOT_FILE);
        self.store()
            .put_json(&slot_file, &serde_json::to_value(&stats)?)
            .await?;

        self.cache()
            .put(&photos_path, serde_json::to_value(&index)?, ts);
        self.cache()
            .put(&slot_file, serde_json::to_value(&stats)?, ts);

        Ok(index)
    }

    /// Stage D: confirm every expected name is in the re-read index.
    /// Disagreement writes `_DIRTY.json`; the operation still succeeds.
    async fn verify_slot(&self, slot_path: &str, files: &[UploadFile]) -> (bool, bool) {
        let photos_path = join(slot_path, PHOTOS_FILE);
        let reason = match self.store().get_json(&photos_path).await {
            Ok(Some(v)) => match serde_json::from_value::<PhotoIndex>(v) {
                Ok(idx) => {
                    let missing: Vec<&str> = files
                        .iter()
                        .filter(|f| !idx.contains_name(&f.name))
                        .map(|f| f.name.as_str())
                        .collect();
                    if missing.is_empty() {
                        None
                    } else {
                        Some(format!("verify: missing from index: {}", missing.join(", ")))
                    }
                }
                Err(e) => Some(format!("verify: index unparseable: {}", e)),
            },
            Ok(None) => Some("verify: index missing after commit".to_string()),
            Err(e) => Some(format!("verify: index unreadable: {}", e)),
        };

        match reason {
            None => (true, false),
            Some(reason) => {
                warn!(slot = %slot_path, reason, "verify failed, marking slot dirty");
                let marker = DirtyMarker::new(&reason, slot_path, now());
                let wrote = match serde_json::to_value(&marker) {
                    Ok(value) => self
                        .store()
                        .put_json(&join(slot_path, DIRTY_FILE), &value)
                        .await
                        .is_ok(),
                    Err(_) => false,
                };
                (false, wrote)
            }
        }
    }
}
