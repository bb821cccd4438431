//! Filesystem primitives shared across features.

pub mod checksum;
pub mod paths;

pub use checksum::{checksum_bytes, checksum_file, verify_checksum};
pub use paths::{ensure_relative_path, normalize_path, remove_path_if_exists, resolve_within};
