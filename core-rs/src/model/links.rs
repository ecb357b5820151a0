//! Per-car external links (`_LINKS.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One external reference attached to a car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// The `_LINKS.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinksFile {
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LinksFile {
    pub fn add(&mut self, title: &str, url: &str, created_by: &str, now: DateTime<Utc>) -> Link {
        let link = Link {
            id: Uuid::new_v4(),
            title: title.to_string(),
            url: url.to_string(),
            created_at: now,
            created_by: created_by.to_string(),
        };
        self.links.push(link.clone());
        self.updated_at = Some(now);
        link
    }

    /// Returns true when a link was removed.
    pub fn remove(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.id != id);
        let removed = self.links.len() != before;
        if removed {
            self.updated_at = Some(now);
        }
        removed
    }

    pub fn find(&self, id: Uuid) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }
}
