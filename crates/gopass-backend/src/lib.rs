//! gopass-backend: the contracts every store is assembled from.
//!
//! A store is a (crypto, sync, storage) triple named by a [`BackendUrl`].
//! This crate defines the three traits, the registry that maps backend ids
//! to loaders, and the simple backends (`fs`, `kvmock`, `gitcli`,
//! `gitmock`, `gpgmock`).

pub mod context;
pub mod crypto;
pub mod id;
pub mod loaders;
pub mod name;
pub mod rcs;
pub mod registry;
pub mod storage;
pub mod url;

pub use context::Context;
pub use crypto::Crypto;
pub use id::{BackendId, CryptoBackend, StorageBackend, SyncBackend};
pub use rcs::{Rcs, Revision};
pub use registry::{CryptoLoader, Loader, RcsLoader, Registries, Registry, StorageLoader};
pub use storage::{FsckReport, Storage};
pub use url::BackendUrl;
