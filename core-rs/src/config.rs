//! Engine configuration
//!
//! All knobs are environment-sourced (the service runs in containers and
//! takes no config file). `EngineConfig::from_env()` reads the documented
//! variables, falls back to defaults on absent or unparseable values, and
//! clamps the index TTLs into their supported ranges.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Default remote-store base directory.
pub const DEFAULT_BASE_DIR: &str = "/Фото";

/// Reserved archive region tag.
pub const ARCHIVE_REGION: &str = "ALL";

/// Per-slot photo cap.
pub const DEFAULT_MAX_PHOTOS: usize = 40;

/// Per-slot payload cap, megabytes.
pub const DEFAULT_MAX_SLOT_MB: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// OAuth token for the remote store. Absent in memory-store mode.
    pub token: Option<String>,
    /// Root directory on the remote store.
    pub base_dir: String,
    /// Allowed region tags, normalized uppercase.
    pub regions: Vec<String>,
    /// Admin scope: a region tag or `ALL`.
    pub admin_region: String,

    /// Per-slot photo count cap.
    pub max_photos_per_slot: usize,
    /// Per-slot total size cap, MB.
    pub max_slot_size_mb: f64,
    /// Per-request single-file cap, MB.
    pub max_file_size_mb: f64,
    /// Per-request file count cap.
    pub max_files_per_upload: usize,
    /// Per-request total size cap, MB.
    pub max_total_upload_size_mb: f64,

    /// `_REGION.json` freshness window, ms. Clamped to [10 min, 30 min].
    pub region_index_ttl_ms: u64,
    /// `_PHOTOS.json` freshness window, ms. Clamped to [1 min, 2 min].
    pub photos_index_ttl_ms: u64,
    /// `_SLOT.json` freshness window, ms. Clamped to [1 min, 2 min].
    pub slot_stats_ttl_ms: u64,
    /// `_LOCK.json` lifetime, ms.
    pub lock_ttl_ms: u64,

    /// Base backoff for archive/restore move retries, ms.
    pub archive_retry_delay_ms: u64,

    pub debug_disk_calls: bool,
    pub debug_write_pipeline: bool,
    pub debug_region_index: bool,
    pub debug_car_loading: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_dir: DEFAULT_BASE_DIR.to_string(),
            regions: Vec::new(),
            admin_region: ARCHIVE_REGION.to_string(),
            max_photos_per_slot: DEFAULT_MAX_PHOTOS,
            max_slot_size_mb: DEFAULT_MAX_SLOT_MB,
            max_file_size_mb: 10.0,
            max_files_per_upload: 20,
            max_total_upload_size_mb: 100.0,
            region_index_ttl_ms: 10 * 60 * 1000,
            photos_index_ttl_ms: 2 * 60 * 1000,
            slot_stats_ttl_ms: 2 * 60 * 1000,
            lock_ttl_ms: 5 * 60 * 1000,
            archive_retry_delay_ms: 1000,
            debug_disk_calls: false,
            debug_write_pipeline: false,
            debug_region_index: false,
            debug_car_loading: false,
        }
    }
}

impl EngineConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a closure over a map so they
    /// never mutate process-global state.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        cfg.token = lookup("YANDEX_DISK_TOKEN").filter(|t| !t.trim().is_empty());

        if let Some(dir) = lookup("YANDEX_DISK_BASE_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                cfg.base_dir = dir.to_string();
            }
        }

        if let Some(list) = lookup("REGIONS") {
            cfg.regions = list
                .split(',')
                .map(|r| r.trim().to_uppercase())
                .filter(|r| !r.is_empty())
                .collect();
        }

        if let Some(admin) = lookup("ADMIN_REGION") {
            let admin = admin.trim().to_uppercase();
            if !admin.is_empty() {
                cfg.admin_region = admin;
            }
        }

        cfg.max_photos_per_slot =
            parse_or("MAX_PHOTOS_PER_SLOT", &lookup, cfg.max_photos_per_slot);
        cfg.max_slot_size_mb = parse_or("MAX_SLOT_SIZE_MB", &lookup, cfg.max_slot_size_mb);
        cfg.max_file_size_mb = parse_or("MAX_FILE_SIZE_MB", &lookup, cfg.max_file_size_mb);
        cfg.max_files_per_upload =
            parse_or("MAX_FILES_PER_UPLOAD", &lookup, cfg.max_files_per_upload);
        cfg.max_total_upload_size_mb =
            parse_or("MAX_TOTAL_UPLOAD_SIZE_MB", &lookup, cfg.max_total_upload_size_mb);

        cfg.region_index_ttl_ms = clamp_ttl(
            "REGION_INDEX_TTL_MS",
            parse_or("REGION_INDEX_TTL_MS", &lookup, cfg.region_index_ttl_ms),
            10 * 60 * 1000,
            30 * 60 * 1000,
        );
        cfg.photos_index_ttl_ms = clamp_ttl(
            "PHOTOS_INDEX_TTL_MS",
            parse_or("PHOTOS_INDEX_TTL_MS", &lookup, cfg.photos_index_ttl_ms),
            60 * 1000,
            2 * 60 * 1000,
        );
        cfg.slot_stats_ttl_ms = clamp_ttl(
            "SLOT_STATS_TTL_MS",
            parse_or("SLOT_STATS_TTL_MS", &lookup, cfg.slot_stats_ttl_ms),
            60 * 1000,
            2 * 60 * 1000,
        );
        cfg.lock_ttl_ms = clamp_ttl(
            "LOCK_TTL_MS",
            parse_or("LOCK_TTL_MS", &lookup, cfg.lock_ttl_ms),
            60 * 1000,
            30 * 60 * 1000,
        );

        cfg.archive_retry_delay_ms = parse_or(
            "ARCHIVE_RETRY_DELAY_MS",
            &lookup,
            cfg.archive_retry_delay_ms,
        );

        cfg.debug_disk_calls = flag("DEBUG_DISK_CALLS", &lookup);
        cfg.debug_write_pipeline = flag("DEBUG_WRITE_PIPELINE", &lookup);
        cfg.debug_region_index = flag("DEBUG_REGION_INDEX", &lookup);
        cfg.debug_car_loading = flag("DEBUG_CAR_LOADING", &lookup);

        cfg
    }

    /// `_LOCK.json` lifetime as a duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Freshness window for `_REGION.json`.
    pub fn region_index_ttl(&self) -> Duration {
        Duration::from_millis(self.region_index_ttl_ms)
    }

    /// Freshness window for `_PHOTOS.json`.
    pub fn photos_index_ttl(&self) -> Duration {
        Duration::from_millis(self.photos_index_ttl_ms)
    }

    /// Freshness window for `_SLOT.json`.
    pub fn slot_stats_ttl(&self) -> Duration {
        Duration::from_millis(self.slot_stats_ttl_ms)
    }

    /// True when `region` is in the allowed set. `ALL` is only reachable
    /// through the admin scope.
    pub fn region_allowed(&self, region: &str) -> bool {
        if region == ARCHIVE_REGION {
            return self.admin_region == ARCHIVE_REGION;
        }
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

fn clamp_ttl(key: &str, value: u64, min: u64, max: u64) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(key, value, clamped, "TTL outside supported range, clamped");
    }
    clamped
}

fn flag<F>(key: &str, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    matches!(
        lookup(key).as_deref().map(str::trim),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}
