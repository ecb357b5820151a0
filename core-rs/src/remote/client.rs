//! HTTP client for the cloud file store
//!
//! Talks the store's REST API: PUT directory, signed-URL upload and
//! download handshakes, GET metadata/listing, DELETE, POST move, PUT
//! publish. Transient failures retry with exponential backoff; every
//! top-level call gets a request id for the `disk_calls` debug target.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{DiskError, Result};
use crate::path::assert_disk_path;

use super::api::{classify, HrefResponse, ResourceMeta, StatusClass};
use super::retry::RetryPolicy;
use super::{Entry, RemoteStore, LIST_LIMIT};

const API_BASE: &str = "https://cloud-api.yandex.net/v1/disk/resources";

/// Adapter over the cloud store's HTTP API.
pub struct DiskClient {
    http: reqwest::Client,
    token: String,
    policy: RetryPolicy,
    debug_calls: bool,
}

impl DiskClient {
    /// Build a client with the default retry policy and a 60 s call
    /// timeout (uploads included).
    pub fn new(token: &str, debug_calls: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DiskError::RemotePermanent {
                stage: "init".to_string(),
                path: "-".to_string(),
                detail: format!("http client: {}", e),
            })?;
        Ok(Self {
            http,
            token: token.to_string(),
            policy: RetryPolicy::default(),
            debug_calls,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn auth_header(&self) -> String {
        format!("OAuth {}", self.token)
    }

    fn trace(&self, request_id: &Uuid, stage: &str, path: &str) {
        if self.debug_calls {
            debug!(target: "disk_calls", request_id = %request_id, stage, path, "store call");
        }
    }

    fn transient(stage: &str, path: &str, detail: String) -> DiskError {
        DiskError::RemoteTransient {
            stage: stage.to_string(),
            path: path.to_string(),
            detail,
        }
    }

    fn permanent(stage: &str, path: &str, detail: String) -> DiskError {
        DiskError::RemotePermanent {
            stage: stage.to_string(),
            path: path.to_string(),
            detail,
        }
    }

    /// Send a request, retrying transient statuses and network errors.
    /// Returns the first terminal response of any class; the caller maps
    /// status classes to its own semantics (404 may be a value, 409 may
    /// be success).
    async fn send_classified<F>(&self, stage: &str, path: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        for attempt in 0u32.. {
            match build()
                .header(AUTHORIZATION, self.auth_header())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if classify(status) == StatusClass::Transient && self.policy.has_next(attempt) {
                        debug!(target: "disk_calls", stage, path, status, attempt, "transient, retrying");
                    } else {
                        return Ok(resp);
                    }
                }
                Err(e) => {
                    if !self.policy.has_next(attempt) {
                        return Err(Self::transient(stage, path, format!("network: {}", e)));
                    }
                    debug!(target: "disk_calls", stage, path, attempt, error = %e, "network error, retrying");
                }
            }
            tokio::time::sleep(self.policy.backoff(attempt)).await;
        }
        unreachable!("retry loop always returns")
    }

    /// Map a terminal non-success status with no special caller
    /// semantics into an error.
    fn status_error(stage: &str, path: &str, status: u16) -> DiskError {
        match classify(status) {
            StatusClass::Transient => {
                Self::transient(stage, path, format!("status {} after retries", status))
            }
            _ => Self::permanent(stage, path, format!("status {}", status)),
        }
    }

    async fn create_dir(&self, stage: &str, path: &str) -> Result<()> {
        let resp = self
            .send_classified(stage, path, || {
                self.http.put(API_BASE).query(&[("path", path)])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            // 409 here means somebody else created it first; that is
            // exactly the outcome we wanted.
            StatusClass::Success | StatusClass::Conflict => Ok(()),
            _ => Err(Self::status_error(stage, path, resp.status().as_u16())),
        }
    }

    /// Resolve a signed href (upload or download handshake).
    async fn resolve_href(&self, stage: &str, endpoint: &str, path: &str) -> Result<Option<String>> {
        let url = format!("{}/{}", API_BASE, endpoint);
        let resp = self
            .send_classified(stage, path, || {
                let mut req = self.http.get(&url).query(&[("path", path)]);
                if endpoint == "upload" {
                    req = req.query(&[("overwrite", "true")]);
                }
                req
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => {
                let href: HrefResponse = resp
                    .json()
                    .await
                    .map_err(|e| Self::transient(stage, path, format!("handshake body: {}", e)))?;
                Ok(Some(href.href))
            }
            StatusClass::Absent => Ok(None),
            _ => Err(Self::status_error(stage, path, resp.status().as_u16())),
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for DiskClient {
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let path = assert_disk_path(path, "ensureDir")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "ensureDir", &path);

        // Create each ancestor in order; every level is idempotent.
        let mut prefix = String::new();
        for segment in path.trim_start_matches('/').split('/') {
            if segment.is_empty() {
                continue;
            }
            prefix.push('/');
            prefix.push_str(segment);
            self.create_dir("ensureDir", &prefix).await?;
        }
        Ok(())
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = assert_disk_path(path, "uploadBytes")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "uploadBytes", &path);

        let href = self
            .resolve_href("uploadBytes", "upload", &path)
            .await?
            .ok_or_else(|| {
                Self::permanent("uploadBytes", &path, "upload target directory absent".to_string())
            })?;

        let resp = self
            .send_classified("uploadBytes", &path, || {
                self.http
                    .put(&href)
                    .header(CONTENT_TYPE, content_type)
                    .body(bytes.clone())
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => Ok(()),
            _ => Err(Self::status_error(
                "uploadBytes",
                &path,
                resp.status().as_u16(),
            )),
        }
    }

    async fn put_json(&self, path: &str, value: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put_bytes(path, body, "application/json").await
    }

    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let path = assert_disk_path(path, "getJSON")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "getJSON", &path);

        let Some(href) = self.resolve_href("getJSON", "download", &path).await? else {
            return Ok(None);
        };

        let resp = self
            .send_classified("getJSON", &path, || self.http.get(&href))
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| Self::transient("getJSON", &path, format!("body: {}", e)))?;
                serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| DiskError::IndexCorrupt {
                        path: path.clone(),
                        detail: format!("unparseable JSON: {}", e),
                    })
            }
            StatusClass::Absent => Ok(None),
            _ => Err(Self::status_error("getJSON", &path, resp.status().as_u16())),
        }
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<Entry>>> {
        let path = assert_disk_path(path, "list")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "list", &path);

        let limit = LIST_LIMIT.to_string();
        let resp = self
            .send_classified("list", &path, || {
                self.http
                    .get(API_BASE)
                    .query(&[("path", path.as_str()), ("limit", limit.as_str())])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => {
                let meta: ResourceMeta = resp
                    .json()
                    .await
                    .map_err(|e| Self::transient("list", &path, format!("body: {}", e)))?;
                let items = meta
                    .embedded
                    .map(|e| e.items.iter().map(ResourceMeta::to_entry).collect())
                    .unwrap_or_default();
                Ok(Some(items))
            }
            StatusClass::Absent => Ok(None),
            _ => Err(Self::status_error("list", &path, resp.status().as_u16())),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = assert_disk_path(path, "exists")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "exists", &path);

        let resp = self
            .send_classified("exists", &path, || {
                self.http
                    .get(API_BASE)
                    .query(&[("path", path.as_str()), ("fields", "name")])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => Ok(true),
            StatusClass::Absent => Ok(false),
            _ => Err(Self::status_error("exists", &path, resp.status().as_u16())),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = assert_disk_path(path, "delete")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "delete", &path);

        let resp = self
            .send_classified("delete", &path, || {
                self.http
                    .delete(API_BASE)
                    .query(&[("path", path.as_str()), ("permanently", "true")])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            // Absent: already gone, which is the requested end state.
            StatusClass::Success | StatusClass::Absent => Ok(()),
            _ => Err(Self::status_error("delete", &path, resp.status().as_u16())),
        }
    }

    async fn move_path(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let from = assert_disk_path(from, "move")?;
        let to = assert_disk_path(to, "move")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "move", &from);

        let url = format!("{}/move", API_BASE);
        let overwrite_flag = if overwrite { "true" } else { "false" };
        let resp = self
            .send_classified("move", &from, || {
                self.http.post(&url).query(&[
                    ("from", from.as_str()),
                    ("path", to.as_str()),
                    ("overwrite", overwrite_flag),
                ])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => Ok(()),
            // Destination conflict is a caller decision, not a retry.
            StatusClass::Conflict => Err(DiskError::AlreadyExists(to.clone())),
            _ => Err(Self::status_error("move", &from, resp.status().as_u16())),
        }
    }

    async fn publish(&self, path: &str) -> Result<String> {
        let path = assert_disk_path(path, "publish")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "publish", &path);

        let url = format!("{}/publish", API_BASE);
        let resp = self
            .send_classified("publish", &path, || {
                self.http.put(&url).query(&[("path", path.as_str())])
            })
            .await?;
        if classify(resp.status().as_u16()) != StatusClass::Success {
            return Err(Self::status_error("publish", &path, resp.status().as_u16()));
        }

        // The publish endpoint answers with an operation href; the public
        // URL lands on the resource metadata.
        let resp = self
            .send_classified("publish", &path, || {
                self.http
                    .get(API_BASE)
                    .query(&[("path", path.as_str()), ("fields", "public_url")])
            })
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => {
                let meta: ResourceMeta = resp
                    .json()
                    .await
                    .map_err(|e| Self::transient("publish", &path, format!("body: {}", e)))?;
                meta.public_url.ok_or_else(|| {
                    Self::permanent("publish", &path, "no public_url after publish".to_string())
                })
            }
            _ => Err(Self::status_error("publish", &path, resp.status().as_u16())),
        }
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let path = assert_disk_path(path, "downloadURL")?;
        let rid = Uuid::new_v4();
        self.trace(&rid, "downloadURL", &path);

        self.resolve_href("downloadURL", "download", &path)
            .await?
            .ok_or_else(|| Self::permanent("downloadURL", &path, "resource absent".to_string()))
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let href = self.download_url(path).await?;
        let resp = self
            .send_classified("downloadFile", path, || self.http.get(&href))
            .await?;
        match classify(resp.status().as_u16()) {
            StatusClass::Success => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| Self::transient("downloadFile", path, format!("body: {}", e))),
            _ => Err(Self::status_error(
                "downloadFile",
                path,
                resp.status().as_u16(),
            )),
        }
    }
}
