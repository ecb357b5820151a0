//! # photodisk core - Disk-as-Truth storage engine
//!
//! Rust implementation of the storage core behind the regional
//! car-inspection photo service. The original runtime was TypeScript;
//! this crate reimplements its disk engine against the same on-store
//! layout, so both can operate on the same tree.
//!
//! ## Core Principle
//!
//! **The remote disk IS the database**: every index the service reads
//! (`_PHOTOS.json`, `_SLOT.json`, `_REGION.json`) is derived from the
//! directory listings and can be rebuilt from them at any time. The
//! engine keeps them consistent through a four-stage write pipeline and
//! a reconcile pass that reads trigger on missing, corrupt or stale
//! indexes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   remote store (single source)      │
//! │   <BASE>/<REGION>/<car>/<slots>     │
//! └─────────────────────────────────────┘
//!              ▲
//!              │ RemoteStore (HTTP / memory)
//!     ┌────────┴────────┐
//!     │  Engine          │  read path · write pipeline · reconcile
//!     └────────┬────────┘
//!              │
//!     ┌────────┴────────┐
//!     │  PhotoService    │  region ACL · request caps · API surface
//!     └─────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod path;
pub mod remote;

pub use api::PhotoService;
pub use config::{EngineConfig, ARCHIVE_REGION, DEFAULT_BASE_DIR};
pub use engine::{Engine, ReconcileDepth, ReconcileReport, SlotCounts, UploadFile, UploadOutcome};
pub use errors::{DiskError, Result};
pub use model::{
    Car, CarMeta, CarSummary, DirtyMarker, Link, LinksFile, LockFile, PhotoIndex, PhotoItem,
    PublishedUrl, RegionCar, RegionIndex, SlotDescriptor, SlotStats, UsedMarker,
};
pub use path::{SlotRef, SlotType, Vin};
pub use remote::{DiskClient, Entry, EntryKind, MemoryStore, RemoteStore, RetryPolicy};

/// Crate version, also stamped into CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
