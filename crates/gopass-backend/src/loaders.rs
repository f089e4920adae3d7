//! Loaders for the backends that live in this crate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gopass_core::GopassResult;

use crate::context::Context;
use crate::crypto::{Crypto, PlainCrypto};
use crate::rcs::{GitCli, GitMock, Rcs};
use crate::registry::{CryptoLoader, Loader, RcsLoader, StorageLoader};
use crate::storage::{OpendalStorage, Storage};
use crate::url::BackendUrl;

pub struct FsLoader;

impl Loader for FsLoader {
    fn priority(&self) -> i32 {
        50
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[async_trait]
impl StorageLoader for FsLoader {
    async fn open(&self, _ctx: &Context, url: &BackendUrl, _crypto: Arc<dyn Crypto>) -> GopassResult<Arc<dyn Storage>> {
        Ok(Arc::new(OpendalStorage::fs(&url.path_buf())?))
    }

    async fn handles(&self, _ctx: &Context, path: &Path) -> GopassResult<bool> {
        Ok(tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false))
    }
}

pub struct KvMockLoader;

impl Loader for KvMockLoader {
    fn priority(&self) -> i32 {
        1000
    }

    fn name(&self) -> &'static str {
        "kvmock"
    }
}

#[async_trait]
impl StorageLoader for KvMockLoader {
    async fn open(&self, _ctx: &Context, _url: &BackendUrl, _crypto: Arc<dyn Crypto>) -> GopassResult<Arc<dyn Storage>> {
        Ok(Arc::new(OpendalStorage::memory()?))
    }

    async fn handles(&self, _ctx: &Context, _path: &Path) -> GopassResult<bool> {
        Ok(false)
    }
}

pub struct GitCliLoader;

impl Loader for GitCliLoader {
    fn priority(&self) -> i32 {
        1
    }

    fn name(&self) -> &'static str {
        "gitcli"
    }
}

#[async_trait]
impl RcsLoader for GitCliLoader {
    async fn open(&self, _ctx: &Context, path: &Path) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitCli::open(path)?))
    }

    async fn init(&self, ctx: &Context, path: &Path, user: &str, email: &str) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitCli::init(ctx, path, user, email).await?))
    }

    async fn clone_repo(&self, ctx: &Context, repo: &str, path: &Path) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitCli::clone(ctx, repo, path).await?))
    }

    async fn handles(&self, _ctx: &Context, path: &Path) -> GopassResult<bool> {
        Ok(tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false))
    }
}

/// Fallback sync backend; accepts any store.
pub struct GitMockLoader;

impl Loader for GitMockLoader {
    fn priority(&self) -> i32 {
        1000
    }

    fn name(&self) -> &'static str {
        "gitmock"
    }
}

#[async_trait]
impl RcsLoader for GitMockLoader {
    async fn open(&self, _ctx: &Context, _path: &Path) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitMock))
    }

    async fn init(&self, _ctx: &Context, _path: &Path, _user: &str, _email: &str) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitMock))
    }

    async fn clone_repo(&self, _ctx: &Context, _repo: &str, _path: &Path) -> GopassResult<Arc<dyn Rcs>> {
        Ok(Arc::new(GitMock))
    }

    async fn handles(&self, _ctx: &Context, _path: &Path) -> GopassResult<bool> {
        Ok(true)
    }
}

pub struct PlainCryptoLoader;

impl Loader for PlainCryptoLoader {
    fn priority(&self) -> i32 {
        1000
    }

    fn name(&self) -> &'static str {
        "gpgmock"
    }
}

#[async_trait]
impl CryptoLoader for PlainCryptoLoader {
    async fn open(&self, _ctx: &Context, _path: &Path) -> GopassResult<Arc<dyn Crypto>> {
        Ok(Arc::new(PlainCrypto::new()))
    }

    async fn handles(&self, ctx: &Context, storage: &dyn Storage) -> GopassResult<bool> {
        storage.exists(ctx, ".gpg-id").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_handles_directories() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::default();
        assert!(FsLoader.handles(&ctx, dir.path()).await.unwrap());
        assert!(!FsLoader.handles(&ctx, &dir.path().join("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn gitcli_handles_repos_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::default();
        assert!(!GitCliLoader.handles(&ctx, dir.path()).await.unwrap());
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(GitCliLoader.handles(&ctx, dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn plain_crypto_detects_gpg_id() {
        let ctx = Context::default();
        let s = OpendalStorage::memory().unwrap();
        assert!(!PlainCryptoLoader.handles(&ctx, &s).await.unwrap());
        s.set(&ctx, ".gpg-id", b"me").await.unwrap();
        assert!(PlainCryptoLoader.handles(&ctx, &s).await.unwrap());
    }
}
