//! Backend registries: identifier → loader.
//!
//! Nothing registers itself. Binaries call the store crate's
//! `register_default_backends()`, tests build registries by hand.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gopass_core::{GopassError, GopassResult};

use crate::context::Context;
use crate::crypto::Crypto;
use crate::id::{BackendId, CryptoBackend, StorageBackend, SyncBackend};
use crate::rcs::Rcs;
use crate::storage::Storage;
use crate::url::BackendUrl;

/// Shared loader surface used for ordering and display.
pub trait Loader: Send + Sync {
    /// Auto-detection order; lower is probed first.
    fn priority(&self) -> i32;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait CryptoLoader: Loader {
    async fn open(&self, ctx: &Context, path: &Path) -> GopassResult<Arc<dyn Crypto>>;

    /// Whether the store held by `storage` is encrypted with this backend.
    async fn handles(&self, ctx: &Context, storage: &dyn Storage) -> GopassResult<bool>;
}

#[async_trait]
pub trait RcsLoader: Loader {
    async fn open(&self, ctx: &Context, path: &Path) -> GopassResult<Arc<dyn Rcs>>;

    async fn init(&self, ctx: &Context, path: &Path, user: &str, email: &str) -> GopassResult<Arc<dyn Rcs>>;

    async fn clone_repo(&self, ctx: &Context, repo: &str, path: &Path) -> GopassResult<Arc<dyn Rcs>>;

    async fn handles(&self, ctx: &Context, path: &Path) -> GopassResult<bool>;
}

#[async_trait]
pub trait StorageLoader: Loader {
    /// Open an existing store. Overlays use `crypto` for their own metadata.
    async fn open(
        &self,
        ctx: &Context,
        url: &BackendUrl,
        crypto: Arc<dyn Crypto>,
    ) -> GopassResult<Arc<dyn Storage>>;

    async fn init(
        &self,
        ctx: &Context,
        url: &BackendUrl,
        crypto: Arc<dyn Crypto>,
    ) -> GopassResult<Arc<dyn Storage>> {
        self.open(ctx, url, crypto).await
    }

    async fn handles(&self, ctx: &Context, path: &Path) -> GopassResult<bool>;
}

struct Registered<L: ?Sized> {
    name: &'static str,
    loader: Arc<L>,
}

pub struct Registry<K: BackendId, L: ?Sized + Loader> {
    kind: &'static str,
    entries: BTreeMap<K, Registered<L>>,
}

impl<K: BackendId, L: ?Sized + Loader> Registry<K, L> {
    pub fn new(kind: &'static str) -> Self {
        Registry {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Register `loader` for `id`, replacing an earlier registration.
    pub fn register(&mut self, id: K, loader: Arc<L>) {
        tracing::trace!(kind = self.kind, backend = id.name(), "registered backend");
        self.entries.insert(
            id,
            Registered {
                name: id.name(),
                loader,
            },
        );
    }

    pub fn get(&self, id: K) -> GopassResult<Arc<L>> {
        self.entries
            .get(&id)
            .map(|r| Arc::clone(&r.loader))
            .ok_or_else(|| GopassError::NotFound(format!("{} backend {id}", self.kind)))
    }

    pub fn lookup(&self, name: &str) -> Option<K> {
        self.entries
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(id, _)| *id)
    }

    pub fn ids(&self) -> Vec<K> {
        self.entries.keys().copied().collect()
    }

    /// Registered loaders in probing order.
    pub fn by_priority(&self) -> Vec<(K, Arc<L>)> {
        let mut out: Vec<(K, Arc<L>)> = self
            .entries
            .iter()
            .map(|(id, r)| (*id, Arc::clone(&r.loader)))
            .collect();
        out.sort_by_key(|(id, l)| (l.priority(), *id));
        out
    }
}

impl<K: BackendId, L: ?Sized + Loader> Clone for Registry<K, L> {
    fn clone(&self) -> Self {
        Registry {
            kind: self.kind,
            entries: self
                .entries
                .iter()
                .map(|(id, r)| {
                    (
                        *id,
                        Registered {
                            name: r.name,
                            loader: Arc::clone(&r.loader),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl<K: BackendId, L: ?Sized + Loader> fmt::Debug for Registry<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("backends", &self.entries.values().map(|r| r.name).collect::<Vec<_>>())
            .finish()
    }
}

/// The three registries a store is assembled from.
#[derive(Clone, Debug)]
pub struct Registries {
    pub crypto: Registry<CryptoBackend, dyn CryptoLoader>,
    pub rcs: Registry<SyncBackend, dyn RcsLoader>,
    pub storage: Registry<StorageBackend, dyn StorageLoader>,
}

impl Default for Registries {
    fn default() -> Self {
        Registries {
            crypto: Registry::new("crypto"),
            rcs: Registry::new("sync"),
            storage: Registry::new("storage"),
        }
    }
}
