//! Error types for the photodisk core

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("[{stage}] Invalid path syntax: {path}: {reason}")]
    PathSyntax {
        stage: String,
        path: String,
        reason: String,
    },

    #[error("[{stage}] Path traversal rejected: {path}")]
    PathTraversal { stage: String, path: String },

    #[error("Region not allowed: {0}")]
    RegionDenied(String),

    #[error("Car not found: {vin} in region {region}")]
    CarNotFound { region: String, vin: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid slot: {slot_type} index {index}")]
    SlotInvalid { slot_type: String, index: u8 },

    #[error("Invalid VIN: {0}")]
    VinInvalid(String),

    #[error("Photo limit exceeded: {current_count} present, {adding} incoming, cap {max_photos}")]
    PhotoLimitExceeded {
        current_count: usize,
        adding: usize,
        max_photos: usize,
    },

    #[error("Slot size exceeded: {current_mb:.2} MB present, {adding_mb:.2} MB incoming, cap {max_mb:.2} MB")]
    SlotSizeExceeded {
        current_mb: f64,
        adding_mb: f64,
        max_mb: f64,
    },

    #[error("Upload rejected: {0}")]
    UploadCapExceeded(String),

    #[error("Slot locked by {holder} until {expires_at}")]
    LockHeld {
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("[{stage}] Remote store transient failure at {path}: {detail}")]
    RemoteTransient {
        stage: String,
        path: String,
        detail: String,
    },

    #[error("[{stage}] Remote store rejected {path}: {detail}")]
    RemotePermanent {
        stage: String,
        path: String,
        detail: String,
    },

    #[error("Index corrupt at {path}: {detail}")]
    IndexCorrupt { path: String, detail: String },

    #[error("Region index update failed for {region}: {source}")]
    RegionIndexUpdate {
        region: String,
        #[source]
        source: Box<DiskError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DiskError {
    /// HTTP status the API layer maps this error to.
    ///
    /// Internal kinds (`IndexCorrupt`) are never surfaced as-is; they are
    /// routed through reconcile and the 500 here is a backstop.
    pub fn http_status(&self) -> u16 {
        match self {
            DiskError::PathSyntax { .. }
            | DiskError::PathTraversal { .. }
            | DiskError::SlotInvalid { .. }
            | DiskError::VinInvalid(_) => 400,
            DiskError::RegionDenied(_) => 403,
            DiskError::CarNotFound { .. } => 404,
            DiskError::AlreadyExists(_) | DiskError::LockHeld { .. } => 409,
            DiskError::PhotoLimitExceeded { .. }
            | DiskError::SlotSizeExceeded { .. }
            | DiskError::UploadCapExceeded(_) => 413,
            DiskError::RemoteTransient { .. } | DiskError::RemotePermanent { .. } => 502,
            DiskError::RegionIndexUpdate { .. } => 502,
            DiskError::IndexCorrupt { .. } | DiskError::Json(_) => 500,
        }
    }

    /// True when the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiskError::LockHeld { .. }
                | DiskError::RemoteTransient { .. }
                | DiskError::RegionIndexUpdate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DiskError>;
