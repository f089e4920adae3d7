//! Default backend registration and auto-detection.

use std::path::Path;
use std::sync::Arc;

use gopass_age::AgeLoader;
use gopass_backend::loaders::{FsLoader, GitCliLoader, GitMockLoader, KvMockLoader, PlainCryptoLoader};
use gopass_backend::storage::OpendalStorage;
use gopass_backend::{BackendUrl, Context, CryptoBackend, Registries, StorageBackend, SyncBackend};
use gopass_core::config::GopassConfig;
use gopass_core::GopassResult;
use gopass_cryptfs::CryptfsLoader;
use tracing::{debug, warn};

/// Every backend this build ships with.
pub fn register_default_backends(cfg: &GopassConfig) -> Registries {
    let mut r = Registries::default();
    r.crypto.register(CryptoBackend::GpgMock, Arc::new(PlainCryptoLoader));
    r.crypto
        .register(CryptoBackend::Age, Arc::new(AgeLoader::new(cfg.clone())));
    r.rcs.register(SyncBackend::GitMock, Arc::new(GitMockLoader));
    r.rcs.register(SyncBackend::GitCli, Arc::new(GitCliLoader));
    r.storage.register(StorageBackend::Fs, Arc::new(FsLoader));
    r.storage.register(StorageBackend::KvMock, Arc::new(KvMockLoader));
    r.storage.register(StorageBackend::CryptFs, Arc::new(CryptfsLoader));
    r
}

/// The backends a store at `url` is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub crypto: CryptoBackend,
    pub sync: SyncBackend,
    pub storage: StorageBackend,
}

/// Pick backends for `url`: a pinned URL wins, then the context
/// overrides, then the first loader (by priority) recognising the path,
/// then the defaults.
pub async fn select(ctx: &Context, regs: &Registries, url: &BackendUrl) -> GopassResult<Selection> {
    if url.pinned {
        return Ok(Selection {
            crypto: url.crypto,
            sync: url.sync,
            storage: url.storage,
        });
    }
    let path = url.path_buf();

    let storage = match ctx.storage_backend {
        Some(id) => id,
        None => detect_storage(ctx, regs, &path).await?.unwrap_or_default(),
    };
    let crypto = match ctx.crypto_backend {
        Some(id) => id,
        None => {
            let detected = detect_crypto(ctx, regs, &path).await?.unwrap_or_default();
            if detected == CryptoBackend::GpgMock {
                warn!(
                    path = %path.display(),
                    "store detected as gpgmock: entries are written unencrypted, pin the backend to silence this"
                );
            }
            detected
        }
    };
    let sync = match ctx.sync_backend {
        Some(id) => id,
        None => detect_sync(ctx, regs, &path).await?.unwrap_or_default(),
    };

    let sel = Selection { crypto, sync, storage };
    debug!(path = %path.display(), ?sel, "selected backends");
    Ok(sel)
}

async fn detect_storage(ctx: &Context, regs: &Registries, path: &Path) -> GopassResult<Option<StorageBackend>> {
    for (id, loader) in regs.storage.by_priority() {
        if loader.handles(ctx, path).await? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

async fn detect_sync(ctx: &Context, regs: &Registries, path: &Path) -> GopassResult<Option<SyncBackend>> {
    for (id, loader) in regs.rcs.by_priority() {
        if loader.handles(ctx, path).await? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Crypto is recognised by the recipient file at the store root, which
/// every storage keeps in plain view.
async fn detect_crypto(ctx: &Context, regs: &Registries, path: &Path) -> GopassResult<Option<CryptoBackend>> {
    if !tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(None);
    }
    let probe = OpendalStorage::fs(path)?;
    for (id, loader) in regs.crypto.by_priority() {
        if loader.handles(ctx, &probe).await? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> Registries {
        register_default_backends(&GopassConfig::default())
    }

    #[tokio::test]
    async fn pinned_url_is_taken_verbatim() {
        let url = BackendUrl::parse("age-gitmock-kvmock+file:///nonexistent").unwrap();
        let ctx = Context::default().with_crypto_backend(CryptoBackend::GpgMock);
        let sel = select(&ctx, &regs(), &url).await.unwrap();
        assert_eq!(sel.crypto, CryptoBackend::Age);
        assert_eq!(sel.sync, SyncBackend::GitMock);
        assert_eq!(sel.storage, StorageBackend::KvMock);
    }

    #[tokio::test]
    async fn detects_from_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".age-recipients"), "age1x\n").unwrap();
        std::fs::write(dir.path().join(gopass_cryptfs::MAPPING_FILE), "x").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let url = BackendUrl::from_path(dir.path());
        let sel = select(&Context::default(), &regs(), &url).await.unwrap();
        assert_eq!(sel.crypto, CryptoBackend::Age);
        assert_eq!(sel.sync, SyncBackend::GitCli);
        assert_eq!(sel.storage, StorageBackend::CryptFs);
    }

    #[tokio::test]
    async fn plain_directory_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gpg-id"), "0xDEADBEEF\n").unwrap();
        let url = BackendUrl::from_path(dir.path());

        let sel = select(&Context::default(), &regs(), &url).await.unwrap();
        assert_eq!(sel.crypto, CryptoBackend::GpgMock);
        assert_eq!(sel.sync, SyncBackend::GitMock);
        assert_eq!(sel.storage, StorageBackend::Fs);

        let ctx = Context::default().with_sync_backend(SyncBackend::GitCli);
        assert_eq!(select(&ctx, &regs(), &url).await.unwrap().sync, SyncBackend::GitCli);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn detected_plaintext_crypto_is_warned_about() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gpg-id"), "0xDEADBEEF\n").unwrap();
        let sel = select(&Context::default(), &regs(), &BackendUrl::from_path(dir.path()))
            .await
            .unwrap();
        assert_eq!(sel.crypto, CryptoBackend::GpgMock);
        assert!(logs.text().contains("entries are written unencrypted"));

        // a pinned backend is an explicit choice
        let url = BackendUrl::parse(&format!("gpgmock-gitmock-fs+file://{}", dir.path().display())).unwrap();
        let before = logs.text().len();
        select(&Context::default(), &regs(), &url).await.unwrap();
        let ctx = Context::default().with_crypto_backend(CryptoBackend::GpgMock);
        select(&ctx, &regs(), &BackendUrl::from_path(dir.path())).await.unwrap();
        assert_eq!(logs.text().len(), before);
    }

    #[tokio::test]
    async fn missing_directory_gets_defaults() {
        let url = BackendUrl::from_path("/nonexistent/store");
        let sel = select(&Context::default(), &regs(), &url).await.unwrap();
        assert_eq!(sel.crypto, CryptoBackend::default());
        assert_eq!(sel.storage, StorageBackend::default());
        // gitmock accepts anything
        assert_eq!(sel.sync, SyncBackend::GitMock);
    }
}
