//! Storage contract: a byte map over hierarchical names.
//!
//! There are no directory entries; `is_dir` is derived from the names.
//! Implementations must tolerate concurrent readers.

mod operator;

pub use operator::OpendalStorage;

use async_trait::async_trait;
use gopass_core::{GopassError, GopassResult};

use crate::context::Context;

/// Result of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsckReport {
    /// Stored objects nothing refers to.
    pub orphaned: Vec<String>,
    /// References whose object is gone.
    pub missing: Vec<String>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.missing.is_empty()
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Fails with `NotFound` when `name` is absent.
    async fn get(&self, ctx: &Context, name: &str) -> GopassResult<Vec<u8>>;

    async fn set(&self, ctx: &Context, name: &str, value: &[u8]) -> GopassResult<()>;

    /// Fails with `NotFound` when `name` is absent.
    async fn delete(&self, ctx: &Context, name: &str) -> GopassResult<()>;

    async fn exists(&self, ctx: &Context, name: &str) -> GopassResult<bool>;

    /// Names starting with `prefix`, sorted and free of duplicates.
    async fn list(&self, ctx: &Context, prefix: &str) -> GopassResult<Vec<String>>;

    /// True iff some entry lives under `name/`.
    async fn is_dir(&self, ctx: &Context, name: &str) -> GopassResult<bool>;

    /// Delete everything under `prefix/`; `NotFound` if nothing matched.
    async fn prune(&self, ctx: &Context, prefix: &str) -> GopassResult<()>;

    /// Copy `from` to `to`, removing `from` when `delete` is set.
    async fn rename(&self, ctx: &Context, from: &str, to: &str, delete: bool) -> GopassResult<()> {
        if !self.exists(ctx, from).await? {
            return Err(GopassError::NotFound(from.to_string()));
        }
        if self.exists(ctx, to).await? {
            return Err(GopassError::AlreadyExists(to.to_string()));
        }
        let value = self.get(ctx, from).await?;
        self.set(ctx, to, &value).await?;
        if delete {
            self.delete(ctx, from).await?;
        }
        Ok(())
    }

    /// Paths the sync layer should stage for the given entry names.
    async fn rcs_paths(&self, _ctx: &Context, names: &[String]) -> GopassResult<Vec<String>> {
        Ok(names.to_vec())
    }

    async fn fsck(&self, _ctx: &Context) -> GopassResult<FsckReport> {
        Ok(FsckReport::default())
    }

    fn name(&self) -> &'static str;

    /// Location of the store, for display and for the sync layer.
    fn path(&self) -> String;
}
