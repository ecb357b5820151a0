//! In-memory store driver
//!
//! A full `RemoteStore` over a process-local tree. Backs every test and
//! the CLI's `--memory` dry-run mode. Mirrors the cloud store's
//! semantics: one-level listings, idempotent directory creation,
//! destination conflicts on move, permanent deletes.
//!
//! Test hooks: the signed-URL counter (`upload_url_requests`) lets tests
//! assert that preflight rejections never reach the upload endpoint, and
//! `inject_put_failure` simulates terminal upload failures for rollback
//! coverage.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::errors::{DiskError, Result};
use crate::path::assert_disk_path;

use super::{Entry, EntryKind, RemoteStore};

#[derive(Clone)]
enum Node {
    Dir {
        created: DateTime<Utc>,
    },
    File {
        bytes: Vec<u8>,
        content_type: String,
        modified: DateTime<Utc>,
    },
}

struct PutFailure {
    needle: String,
    remaining: u32,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    upload_url_requests: u64,
    put_failures: Vec<PutFailure>,
}

/// In-process implementation of [`RemoteStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned tree is still a tree; recover and continue.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// How many signed upload URLs have been requested. A rejected
    /// preflight must leave this untouched.
    pub fn upload_url_requests(&self) -> u64 {
        self.lock().upload_url_requests
    }

    /// Make the next `times` uploads whose path contains `needle` fail
    /// terminally after the URL handshake.
    pub fn inject_put_failure(&self, needle: &str, times: u32) {
        self.lock().put_failures.push(PutFailure {
            needle: needle.to_string(),
            remaining: times,
        });
    }

    /// Seed a file without URL accounting or failure injection. For
    /// arranging external edits (corrupt indexes, hand-placed photos).
    pub fn insert_raw_file(&self, path: &str, bytes: Vec<u8>) {
        let path = assert_disk_path(path, "insertRaw").expect("test path must normalize");
        let mut inner = self.lock();
        create_parents(&mut inner, &path);
        inner.nodes.insert(
            path,
            Node::File {
                bytes,
                content_type: "application/octet-stream".to_string(),
                modified: Utc::now(),
            },
        );
    }

    fn take_injected_failure(inner: &mut Inner, path: &str) -> bool {
        for failure in inner.put_failures.iter_mut() {
            if failure.remaining > 0 && path.contains(&failure.needle) {
                failure.remaining -= 1;
                return true;
            }
        }
        false
    }
}

fn parent_of(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        None
    } else {
        Some(&path[..idx])
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn create_parents(inner: &mut Inner, path: &str) {
    let mut ancestors = Vec::new();
    let mut cursor = path;
    while let Some(parent) = parent_of(cursor) {
        ancestors.push(parent.to_string());
        cursor = &path[..parent.len()];
    }
    for dir in ancestors.into_iter().rev() {
        inner
            .nodes
            .entry(dir)
            .or_insert_with(|| Node::Dir { created: Utc::now() });
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let path = assert_disk_path(path, "ensureDir")?;
        if path == "/" {
            return Ok(());
        }
        let mut inner = self.lock();
        create_parents(&mut inner, &path);
        match inner.nodes.get(&path) {
            Some(Node::File { .. }) => Err(DiskError::RemotePermanent {
                stage: "ensureDir".to_string(),
                path: path.clone(),
                detail: "a file occupies this path".to_string(),
            }),
            Some(Node::Dir { .. }) => Ok(()),
            None => {
                inner.nodes.insert(path, Node::Dir { created: Utc::now() });
                Ok(())
            }
        }
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = assert_disk_path(path, "uploadBytes")?;
        let mut inner = self.lock();
        inner.upload_url_requests += 1;
        if MemoryStore::take_injected_failure(&mut inner, &path) {
            return Err(DiskError::RemotePermanent {
                stage: "uploadBytes".to_string(),
                path: path.clone(),
                detail: "injected upload failure".to_string(),
            });
        }
        create_parents(&mut inner, &path);
        inner.nodes.insert(
            path,
            Node::File {
                bytes,
                content_type: content_type.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_json(&self, path: &str, value: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put_bytes(path, body, "application/json").await
    }

    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let path = assert_disk_path(path, "getJSON")?;
        let inner = self.lock();
        match inner.nodes.get(&path) {
            Some(Node::File { bytes, .. }) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| DiskError::IndexCorrupt {
                    path: path.clone(),
                    detail: format!("unparseable JSON: {}", e),
                }),
            Some(Node::Dir { .. }) => Err(DiskError::RemotePermanent {
                stage: "getJSON".to_string(),
                path: path.clone(),
                detail: "path is a directory".to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<Entry>>> {
        let path = assert_disk_path(path, "list")?;
        let inner = self.lock();
        if path != "/" {
            match inner.nodes.get(&path) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(DiskError::RemotePermanent {
                        stage: "list".to_string(),
                        path: path.clone(),
                        detail: "path is a file".to_string(),
                    })
                }
                None => return Ok(None),
            }
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let mut entries = Vec::new();
        for (key, node) in inner.nodes.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let entry = match node {
                Node::Dir { created } => Entry {
                    name: last_segment(key).to_string(),
                    path: key.clone(),
                    kind: EntryKind::Dir,
                    size: 0,
                    modified: *created,
                },
                Node::File { bytes, modified, .. } => Entry {
                    name: last_segment(key).to_string(),
                    path: key.clone(),
                    kind: EntryKind::File,
                    size: bytes.len() as u64,
                    modified: *modified,
                },
            };
            entries.push(entry);
        }
        Ok(Some(entries))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = assert_disk_path(path, "exists")?;
        if path == "/" {
            return Ok(true);
        }
        Ok(self.lock().nodes.contains_key(&path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = assert_disk_path(path, "delete")?;
        let mut inner = self.lock();
        let subtree_prefix = format!("{}/", path);
        inner
            .nodes
            .retain(|key, _| key != &path && !key.starts_with(&subtree_prefix));
        Ok(())
    }

    async fn move_path(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let from = assert_disk_path(from, "move")?;
        let to = assert_disk_path(to, "move")?;
        let mut inner = self.lock();

        if !inner.nodes.contains_key(&from) {
            return Err(DiskError::RemotePermanent {
                stage: "move".to_string(),
                path: from.clone(),
                detail: "source absent".to_string(),
            });
        }
        if inner.nodes.contains_key(&to) {
            if !overwrite {
                return Err(DiskError::AlreadyExists(to.clone()));
            }
            let dest_prefix = format!("{}/", to);
            inner
                .nodes
                .retain(|key, _| key != &to && !key.starts_with(&dest_prefix));
        }

        let from_prefix = format!("{}/", from);
        let moved: Vec<(String, Node)> = inner
            .nodes
            .iter()
            .filter(|(key, _)| *key == &from || key.starts_with(&from_prefix))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        for (key, _) in &moved {
            inner.nodes.remove(key);
        }
        create_parents(&mut inner, &to);
        for (key, node) in moved {
            let new_key = format!("{}{}", to, &key[from.len()..]);
            inner.nodes.insert(new_key, node);
        }
        Ok(())
    }

    async fn publish(&self, path: &str) -> Result<String> {
        let path = assert_disk_path(path, "publish")?;
        if !self.lock().nodes.contains_key(&path) {
            return Err(DiskError::RemotePermanent {
                stage: "publish".to_string(),
                path: path.clone(),
                detail: "resource absent".to_string(),
            });
        }
        Ok(format!("https://disk.example/public{}", path))
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let path = assert_disk_path(path, "downloadURL")?;
        if !self.lock().nodes.contains_key(&path) {
            return Err(DiskError::RemotePermanent {
                stage: "downloadURL".to_string(),
                path: path.clone(),
                detail: "resource absent".to_string(),
            });
        }
        Ok(format!("https://disk.example/download{}", path))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let path = assert_disk_path(path, "downloadFile")?;
        match self.lock().nodes.get(&path) {
            Some(Node::File { bytes, .. }) => Ok(bytes.clone()),
            _ => Err(DiskError::RemotePermanent {
                stage: "downloadFile".to_string(),
                path: path.clone(),
                detail: "not a file".to_string(),
            }),
        }
    }
}
