use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gopass_backend::{Context, Crypto, CryptoLoader, Loader, Storage};
use gopass_core::config::GopassConfig;
use gopass_core::GopassResult;

use crate::crypto::{Age, ID_FILE, LEGACY_ID_FILE};

/// Opens [`Age`] for stores that carry an age recipient file.
#[derive(Default)]
pub struct AgeLoader {
    config: GopassConfig,
}

impl AgeLoader {
    pub fn new(config: GopassConfig) -> Self {
        AgeLoader { config }
    }
}

impl Loader for AgeLoader {
    fn priority(&self) -> i32 {
        10
    }

    fn name(&self) -> &'static str {
        crate::crypto::NAME
    }
}

#[async_trait]
impl CryptoLoader for AgeLoader {
    async fn open(&self, _ctx: &Context, _path: &Path) -> GopassResult<Arc<dyn Crypto>> {
        Ok(Arc::new(Age::from_config(&self.config)?))
    }

    async fn handles(&self, ctx: &Context, storage: &dyn Storage) -> GopassResult<bool> {
        if storage.exists(ctx, ID_FILE).await? {
            return Ok(true);
        }
        storage.exists(ctx, LEGACY_ID_FILE).await
    }
}
