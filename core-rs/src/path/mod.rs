//! Path model: normalization and the on-store layout
//!
//! Pure functions only; nothing here touches the network.

pub mod layout;
pub mod normalize;

pub use layout::{
    archive_folder_name, car_folder_name, car_root, get_all_slot_paths, normalize_region,
    parse_car_folder, region_root, slot_path, ParsedCarFolder, SlotRef, SlotType, Vin,
};
pub use normalize::{assert_disk_path, join, normalize, sanitize_filename, sanitize_segment};
