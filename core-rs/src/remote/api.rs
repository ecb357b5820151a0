//! Wire types and status semantics of the cloud store HTTP API

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Entry, EntryKind};

/// Resource metadata returned by the store's GET endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<Embedded>,
}

/// The `_embedded` listing block of a directory resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub items: Vec<ResourceMeta>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Signed-URL handshake response (upload, download, async operations).
#[derive(Debug, Clone, Deserialize)]
pub struct HrefResponse {
    pub href: String,
    #[serde(default)]
    pub method: Option<String>,
}

impl ResourceMeta {
    /// Flatten into the adapter's `Entry`, normalizing the store's
    /// `disk:` path prefix away.
    pub fn to_entry(&self) -> Entry {
        let kind = if self.kind == "dir" {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        let path = self
            .path
            .strip_prefix("disk:")
            .unwrap_or(&self.path)
            .to_string();
        Entry {
            name: self.name.clone(),
            path,
            kind,
            size: self.size.unwrap_or(0),
            modified: self.modified.unwrap_or_else(Utc::now),
        }
    }
}

/// Coarse classification of a store response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx, including 201 created and 202 accepted.
    Success,
    /// 404.
    Absent,
    /// 409: directory already exists, or move destination conflict.
    Conflict,
    /// 429 and 5xx: worth retrying.
    Transient,
    /// Remaining 4xx: terminal.
    Permanent,
}

pub fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 => StatusClass::Absent,
        409 => StatusClass::Conflict,
        429 => StatusClass::Transient,
        500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}
