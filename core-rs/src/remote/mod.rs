//! Remote store adapter
//!
//! Defines the abstract interface over the hierarchical HTTP store.
//! Implementations:
//! - DiskClient (cloud store over HTTP + OAuth)
//! - MemoryStore (in-process tree for tests and dry runs)
//!
//! Every operation takes a raw path and normalizes it through
//! `assert_disk_path` before touching the backend; callers never build
//! store URLs themselves.

pub mod api;
pub mod client;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;

pub use client::DiskClient;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;

/// Listing limit requested per call. The store API is not paginated by
/// this adapter; regions beyond this size are out of scope.
pub const LIST_LIMIT: usize = 10_000;

/// One child of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Zero for directories.
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Typed operations over the hierarchical store.
///
/// Contract assumed from the backend: `201` created, `202` accepted
/// asynchronously, `204` deleted, `404` absent, `409` already-exists on
/// directory create / destination conflict on move, `429` rate-limited,
/// `5xx` transient. Directory create racing another writer is success.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the directory and every missing ancestor. Idempotent.
    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// Upload a file via the signed-URL two-step.
    async fn put_bytes(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// `put_bytes` with a pretty-printed JSON body.
    async fn put_json(&self, path: &str, value: &serde_json::Value) -> Result<()>;

    /// Download and parse a JSON file. `None` when the path is absent.
    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>>;

    /// One-level listing. `None` when the path is absent.
    async fn list(&self, path: &str) -> Result<Option<Vec<Entry>>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Permanent delete of a file or subtree. Absent paths are Ok.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Move a file or subtree. Destination conflict without `overwrite`
    /// surfaces as `AlreadyExists` so the caller may opt in.
    async fn move_path(&self, from: &str, to: &str, overwrite: bool) -> Result<()>;

    /// Publish a path and return its public URL.
    async fn publish(&self, path: &str) -> Result<String>;

    /// Resolve a signed download URL.
    async fn download_url(&self, path: &str) -> Result<String>;

    /// Fetch file contents through the signed-URL flow.
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

// Multiple engine replicas share one physical store; delegating through
// `Arc` keeps that wiring out of the engine itself.
#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        (**self).ensure_dir(path).await
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        (**self).put_bytes(path, bytes, content_type).await
    }

    async fn put_json(&self, path: &str, value: &serde_json::Value) -> Result<()> {
        (**self).put_json(path, value).await
    }

    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>> {
        (**self).get_json(path).await
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<Entry>>> {
        (**self).list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }

    async fn move_path(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        (**self).move_path(from, to, overwrite).await
    }

    async fn publish(&self, path: &str) -> Result<String> {
        (**self).publish(path).await
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        (**self).download_url(path).await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        (**self).download(path).await
    }
}
