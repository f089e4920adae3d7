use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gopass_backend::storage::OpendalStorage;
use gopass_backend::{BackendUrl, Context, Crypto, Loader, Storage, StorageLoader};
use gopass_core::GopassResult;

use crate::overlay::{Cryptfs, MAPPING_FILE};

/// Cryptfs over a directory on the local filesystem.
pub struct CryptfsLoader;

impl Loader for CryptfsLoader {
    fn priority(&self) -> i32 {
        10
    }

    fn name(&self) -> &'static str {
        "cryptfs"
    }
}

#[async_trait]
impl StorageLoader for CryptfsLoader {
    async fn open(&self, ctx: &Context, url: &BackendUrl, crypto: Arc<dyn Crypto>) -> GopassResult<Arc<dyn Storage>> {
        let inner: Arc<dyn Storage> = Arc::new(OpendalStorage::fs(&url.path_buf())?);
        Ok(Arc::new(Cryptfs::open(ctx, inner, crypto).await?))
    }

    async fn init(&self, ctx: &Context, url: &BackendUrl, crypto: Arc<dyn Crypto>) -> GopassResult<Arc<dyn Storage>> {
        let inner: Arc<dyn Storage> = Arc::new(OpendalStorage::fs(&url.path_buf())?);
        Ok(Arc::new(Cryptfs::init(ctx, inner, crypto).await?))
    }

    async fn handles(&self, _ctx: &Context, path: &Path) -> GopassResult<bool> {
        Ok(tokio::fs::try_exists(path.join(MAPPING_FILE)).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handles_directories_with_a_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::default();
        assert!(!CryptfsLoader.handles(&ctx, dir.path()).await.unwrap());
        std::fs::write(dir.path().join(MAPPING_FILE), b"x").unwrap();
        assert!(CryptfsLoader.handles(&ctx, dir.path()).await.unwrap());
    }
}
