//! Caches shared by the backends.

pub mod disk;
pub mod ttl;

pub use disk::OnDiskCache;
pub use ttl::InMemTtl;
