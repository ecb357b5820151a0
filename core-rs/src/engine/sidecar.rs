//! Per-slot sidecars: used marker, published URL, download URL

use crate::errors::{DiskError, Result};
use crate::model::{PublishedUrl, UsedMarker, PUBLISHED_FILE, USED_FILE};
use crate::path::{assert_disk_path, join};
use crate::remote::RemoteStore;

use super::{now, Engine};

impl<S: RemoteStore> Engine<S> {
    /// Set the administrative "used" flag on a slot.
    pub async fn mark_slot_used(&self, slot_path: &str, actor: &str) -> Result<()> {
        let slot_path = assert_disk_path(slot_path, "markSlotUsed")?;
        let marker = UsedMarker {
            used: true,
            marked_at: now(),
            marked_by: actor.to_string(),
        };
        self.store()
            .put_json(&join(&slot_path, USED_FILE), &serde_json::to_value(&marker)?)
            .await
    }

    /// Clear the "used" flag. Clearing an unset flag is a no-op.
    pub async fn mark_slot_unused(&self, slot_path: &str) -> Result<()> {
        let slot_path = assert_disk_path(slot_path, "markSlotUnused")?;
        self.store().delete(&join(&slot_path, USED_FILE)).await
    }

    pub async fn slot_used(&self, slot_path: &str) -> Result<bool> {
        let slot_path = assert_disk_path(slot_path, "slotUsed")?;
        self.store().exists(&join(&slot_path, USED_FILE)).await
    }

    /// Publish a slot, caching the public URL in `_PUBLISHED.json` so
    /// repeat calls skip the store round-trip.
    pub async fn publish_slot(&self, slot_path: &str, actor: &str) -> Result<String> {
        let slot_path = assert_disk_path(slot_path, "publishSlot")?;
        let published_path = join(&slot_path, PUBLISHED_FILE);

        match self.store().get_json(&published_path).await {
            Ok(Some(v)) => {
                if let Ok(cached) = serde_json::from_value::<PublishedUrl>(v) {
                    return Ok(cached.url);
                }
            }
            Ok(None) => {}
            Err(DiskError::IndexCorrupt { .. }) => {}
            Err(e) => return Err(e),
        }

        let url = self.store().publish(&slot_path).await?;
        let record = PublishedUrl {
            url: url.clone(),
            published_at: now(),
            published_by: actor.to_string(),
        };
        // Cache write is best-effort; the URL is already in hand.
        if let Ok(value) = serde_json::to_value(&record) {
            let _ = self.store().put_json(&published_path, &value).await;
        }
        Ok(url)
    }

    /// Signed download URL for the whole slot directory.
    pub async fn slot_download_url(&self, slot_path: &str) -> Result<String> {
        let slot_path = assert_disk_path(slot_path, "slotDownloadURL")?;
        self.store().download_url(&slot_path).await
    }
}
