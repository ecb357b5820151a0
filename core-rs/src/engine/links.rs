//! Per-car external links (`_LINKS.json`)

use uuid::Uuid;

use crate::config::ARCHIVE_REGION;
use crate::errors::{DiskError, Result};
use crate::model::{Link, LinksFile, LINKS_FILE};
use crate::path::join;
use crate::remote::RemoteStore;

use super::{now, Engine};

impl<S: RemoteStore> Engine<S> {
    /// Read the link list of a car. A missing file is an empty list.
    pub async fn list_links(&self, car_root: &str) -> Result<LinksFile> {
        let links_path = join(car_root, LINKS_FILE);
        match self.store().get_json(&links_path).await {
            Ok(Some(v)) => Ok(serde_json::from_value(v)?),
            Ok(None) => Ok(LinksFile::default()),
            // A corrupt link file yields an empty list rather than a
            // dead car page; the next write replaces it.
            Err(DiskError::IndexCorrupt { .. }) => Ok(LinksFile::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn create_link(
        &self,
        car_root: &str,
        title: &str,
        url: &str,
        created_by: &str,
    ) -> Result<Link> {
        let mut file = self.list_links(car_root).await?;
        let link = file.add(title, url, created_by, now());
        self.store()
            .put_json(&join(car_root, LINKS_FILE), &serde_json::to_value(&file)?)
            .await?;
        Ok(link)
    }

    /// Returns true when the link existed and was removed.
    pub async fn delete_link(&self, car_root: &str, id: Uuid) -> Result<bool> {
        let mut file = self.list_links(car_root).await?;
        let removed = file.remove(id, now());
        if removed {
            self.store()
                .put_json(&join(car_root, LINKS_FILE), &serde_json::to_value(&file)?)
                .await?;
        }
        Ok(removed)
    }

    /// Administrative lookup: scan every configured region plus the
    /// archive, serially. Rare enough that linear cost is fine.
    pub async fn find_link(&self, id: Uuid) -> Result<Option<(String, Link)>> {
        let mut regions = self.config().regions.clone();
        regions.push(ARCHIVE_REGION.to_string());

        for region in regions {
            let index = match self.region_index(&region, false).await {
                Ok(idx) => idx,
                Err(DiskError::RemotePermanent { .. }) => continue,
                Err(e) => return Err(e),
            };
            for car in &index.cars {
                let file = self.list_links(&car.disk_root_path).await?;
                if let Some(link) = file.find(id) {
                    return Ok(Some((car.disk_root_path.clone(), link.clone())));
                }
            }
        }
        Ok(None)
    }
}
