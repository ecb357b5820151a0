//! On-store data model
//!
//! Every piece of persistent state is a JSON sidecar file on the remote
//! store; these are their schemas. PhotoIndex and SlotStats are derived
//! data: at any point they can be rebuilt by listing the slot directory.

pub mod car;
pub mod index;
pub mod links;
pub mod lock;

pub use car::{Car, CarMeta, CarSummary, SlotDescriptor};
pub use index::{PhotoIndex, PhotoItem, RegionCar, RegionIndex, SlotStats};
pub use links::{Link, LinksFile};
pub use lock::{DirtyMarker, LockFile, PublishedUrl, UsedMarker};

/// Authoritative per-slot content index.
pub const PHOTOS_FILE: &str = "_PHOTOS.json";
/// Derived per-slot summary.
pub const SLOT_FILE: &str = "_SLOT.json";
/// Write-pipeline lock.
pub const LOCK_FILE: &str = "_LOCK.json";
/// Slot-may-disagree-with-index marker.
pub const DIRTY_FILE: &str = "_DIRTY.json";
/// Per-region car listing.
pub const REGION_FILE: &str = "_REGION.json";
/// Per-car metadata.
pub const CAR_FILE: &str = "_CAR.json";
/// Per-car external links.
pub const LINKS_FILE: &str = "_LINKS.json";
/// Cached public URL of a published slot.
pub const PUBLISHED_FILE: &str = "_PUBLISHED.json";
/// Administrative "slot used" flag.
pub const USED_FILE: &str = "_USED.json";

/// Schema version stamped into every versioned index.
pub const SCHEMA_VERSION: u32 = 1;

/// True for sidecar/metadata entries that never count as photos.
pub fn is_meta_name(name: &str) -> bool {
    name.starts_with('_')
}
