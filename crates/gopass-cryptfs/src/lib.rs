//! gopass-cryptfs: a storage overlay that hides entry names.
//!
//! See [`Cryptfs`] for the on-disk layout.

pub mod loader;
pub mod overlay;

pub use loader::CryptfsLoader;
pub use overlay::{hash_name, Cryptfs, MAPPING_FILE};
