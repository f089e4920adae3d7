//! A password store: encrypted entries in a storage backend, tracked by a
//! sync backend.

use std::sync::Arc;

use gopass_age::crypto::{LEGACY_ID_FILE, NAME as AGE};
use gopass_backend::name::validate_name;
use gopass_backend::{BackendUrl, Context, Crypto, FsckReport, Rcs, Registries, Revision, Storage};
use gopass_core::config::StoreConfig;
use gopass_core::{GopassError, GopassResult};
use tracing::{debug, info, warn};

use crate::backends::{select, Selection};

pub struct Store {
    url: BackendUrl,
    crypto: Arc<dyn Crypto>,
    rcs: Arc<dyn Rcs>,
    storage: Arc<dyn Storage>,
    auto_commit: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("url", &self.url.to_string())
            .field("crypto", &self.crypto.name())
            .field("sync", &self.rcs.name())
            .field("storage", &self.storage.name())
            .finish()
    }
}

impl Store {
    /// Assemble a store from already opened backends.
    pub fn from_parts(
        url: BackendUrl,
        crypto: Arc<dyn Crypto>,
        rcs: Arc<dyn Rcs>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Store {
            url,
            crypto,
            rcs,
            storage,
            auto_commit: true,
        }
    }

    pub fn with_auto_commit(mut self, on: bool) -> Self {
        self.auto_commit = on;
        self
    }

    /// Open the existing store at `url`.
    pub async fn open(ctx: &Context, regs: &Registries, url: &BackendUrl, cfg: &StoreConfig) -> GopassResult<Self> {
        let sel = select(ctx, regs, url).await?;
        let path = url.path_buf();

        let crypto = regs.crypto.get(sel.crypto)?.open(ctx, &path).await?;
        let storage = regs
            .storage
            .get(sel.storage)?
            .open(ctx, url, crypto.clone())
            .await?;
        let rcs = regs.rcs.get(sel.sync)?.open(ctx, &path).await?;

        let store = Store::from_parts(pinned(url, sel), crypto, rcs, storage).with_auto_commit(cfg.auto_commit);
        store.migrate_legacy_recipients(ctx).await;
        if !store.storage.exists(ctx, store.crypto.id_file()).await? {
            return Err(GopassError::NotInitialized(url.to_string()));
        }
        info!(store = ?store, "store opened");
        Ok(store)
    }

    /// Create a store at `url` encrypted for `recipients`.
    pub async fn init(
        ctx: &Context,
        regs: &Registries,
        url: &BackendUrl,
        cfg: &StoreConfig,
        recipients: &[String],
        user: &str,
        email: &str,
    ) -> GopassResult<Self> {
        let sel = select(ctx, regs, url).await?;
        let path = url.path_buf();

        let crypto = regs.crypto.get(sel.crypto)?.open(ctx, &path).await?;
        let storage = regs
            .storage
            .get(sel.storage)?
            .init(ctx, url, crypto.clone())
            .await?;
        if storage.exists(ctx, crypto.id_file()).await? {
            return Err(GopassError::AlreadyExists(format!("store at {}", url)));
        }
        let rcs = regs.rcs.get(sel.sync)?.init(ctx, &path, user, email).await?;

        let store = Store::from_parts(pinned(url, sel), crypto, rcs, storage).with_auto_commit(cfg.auto_commit);
        store.write_recipients(ctx, recipients.to_vec()).await?;
        store
            .commit(ctx, &[store.crypto.id_file().to_string()], "Initialized store")
            .await?;
        info!(store = ?store, "store initialized");
        Ok(store)
    }

    pub fn url(&self) -> &BackendUrl {
        &self.url
    }

    pub fn crypto(&self) -> &Arc<dyn Crypto> {
        &self.crypto
    }

    pub fn rcs(&self) -> &Arc<dyn Rcs> {
        &self.rcs
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.crypto.ext())
    }

    /// Decrypted content of `name`.
    pub async fn get(&self, ctx: &Context, name: &str) -> GopassResult<Vec<u8>> {
        validate_name(name)?;
        let ciphertext = self.storage.get(ctx, &self.file_name(name)).await?;
        self.crypto.decrypt(ctx, &ciphertext).await
    }

    /// Encrypt `plaintext` for the store's recipients and save it as `name`.
    pub async fn set(&self, ctx: &Context, name: &str, plaintext: &[u8]) -> GopassResult<()> {
        validate_name(name)?;
        let recipients = self.recipients(ctx).await?;
        let ciphertext = self.crypto.encrypt(ctx, plaintext, &recipients).await?;
        let file = self.file_name(name);
        self.storage.set(ctx, &file, &ciphertext).await?;
        debug!(name, "entry saved");
        self.commit(ctx, &[file], &format!("Save secret to {name}")).await
    }

    pub async fn delete(&self, ctx: &Context, name: &str) -> GopassResult<()> {
        validate_name(name)?;
        let file = self.file_name(name);
        self.storage.delete(ctx, &file).await?;
        self.commit(ctx, &[file], &format!("Remove {name} from store")).await
    }

    pub async fn exists(&self, ctx: &Context, name: &str) -> GopassResult<bool> {
        self.storage.exists(ctx, &self.file_name(name)).await
    }

    pub async fn is_dir(&self, ctx: &Context, name: &str) -> GopassResult<bool> {
        self.storage.is_dir(ctx, name).await
    }

    /// Entry names under `prefix`, without extension, sorted.
    pub async fn list(&self, ctx: &Context, prefix: &str) -> GopassResult<Vec<String>> {
        let suffix = format!(".{}", self.crypto.ext());
        let mut names: Vec<String> = self
            .storage
            .list(ctx, prefix)
            .await?
            .into_iter()
            .filter_map(|n| n.strip_suffix(&suffix).map(String::from))
            .filter(|n| validate_name(n).is_ok())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Copy `from` to `to`, removing `from` when `delete` is set.
    pub async fn move_entry(&self, ctx: &Context, from: &str, to: &str, delete: bool) -> GopassResult<()> {
        validate_name(from)?;
        validate_name(to)?;
        let (src, dst) = (self.file_name(from), self.file_name(to));
        self.storage.rename(ctx, &src, &dst, delete).await?;
        let verb = if delete { "Move" } else { "Copy" };
        self.commit(ctx, &[src, dst], &format!("{verb} {from} to {to}")).await
    }

    /// Delete every entry under `prefix/`.
    pub async fn prune(&self, ctx: &Context, prefix: &str) -> GopassResult<()> {
        let doomed: Vec<String> = self
            .list(ctx, &gopass_backend::name::dir_prefix(prefix))
            .await?
            .iter()
            .map(|n| self.file_name(n))
            .collect();
        self.storage.prune(ctx, prefix).await?;
        self.commit(ctx, &doomed, &format!("Remove {prefix}/ from store")).await
    }

    pub async fn fsck(&self, ctx: &Context) -> GopassResult<FsckReport> {
        let report = self.storage.fsck(ctx).await?;
        if !report.is_clean() {
            warn!(
                orphaned = report.orphaned.len(),
                missing = report.missing.len(),
                "store has inconsistencies"
            );
        }
        Ok(report)
    }

    /// The store's recipient list.
    pub async fn recipients(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        match self.storage.get(ctx, self.crypto.id_file()).await {
            Ok(raw) => Ok(parse_recipients(&raw)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn add_recipient(&self, ctx: &Context, recipient: &str) -> GopassResult<()> {
        let recipient = recipient.trim();
        let mut list = self.recipients(ctx).await?;
        if list.iter().any(|r| r == recipient) {
            return Err(GopassError::AlreadyExists(format!("recipient {recipient}")));
        }
        list.push(recipient.to_string());
        self.write_recipients(ctx, list).await?;
        self.commit(
            ctx,
            &[self.crypto.id_file().to_string()],
            &format!("Added recipient {recipient}"),
        )
        .await
    }

    pub async fn remove_recipient(&self, ctx: &Context, recipient: &str) -> GopassResult<()> {
        let recipient = recipient.trim();
        let list = self.recipients(ctx).await?;
        let kept: Vec<String> = list.iter().filter(|r| *r != recipient).cloned().collect();
        if kept.len() == list.len() {
            return Err(GopassError::NotFound(format!("recipient {recipient}")));
        }
        self.write_recipients(ctx, kept).await?;
        self.commit(
            ctx,
            &[self.crypto.id_file().to_string()],
            &format!("Removed recipient {recipient}"),
        )
        .await
    }

    async fn write_recipients(&self, ctx: &Context, mut list: Vec<String>) -> GopassResult<()> {
        list.retain(|r| !r.trim().is_empty());
        list.sort();
        list.dedup();
        let mut body = list.join("\n");
        body.push('\n');
        self.storage.set(ctx, self.crypto.id_file(), body.as_bytes()).await
    }

    /// Rename `.age-ids` to the current recipient file name. Failures are
    /// logged only.
    async fn migrate_legacy_recipients(&self, ctx: &Context) {
        if self.crypto.name() != AGE {
            return;
        }
        let current = self.crypto.id_file();
        match self.storage.exists(ctx, current).await {
            Ok(false) => {}
            _ => return,
        }
        let raw = match self.storage.get(ctx, LEGACY_ID_FILE).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!(error = %e, "failed to read legacy recipient file");
                return;
            }
        };
        if let Err(e) = self.storage.set(ctx, current, &raw).await {
            warn!(error = %e, "failed to migrate legacy recipient file");
            return;
        }
        if let Err(e) = self.storage.delete(ctx, LEGACY_ID_FILE).await {
            warn!(error = %e, "failed to remove legacy recipient file");
        }
        info!(from = LEGACY_ID_FILE, to = current, "migrated recipient file");
        if let Err(e) = self
            .commit(
                ctx,
                &[LEGACY_ID_FILE.to_string(), current.to_string()],
                "Migrated recipient file",
            )
            .await
        {
            warn!(error = %e, "failed to commit recipient file migration");
        }
    }

    async fn rcs_path(&self, ctx: &Context, name: &str) -> GopassResult<String> {
        let file = self.file_name(name);
        Ok(self
            .storage
            .rcs_paths(ctx, std::slice::from_ref(&file))
            .await?
            .into_iter()
            .find(|p| p != gopass_cryptfs::MAPPING_FILE)
            .unwrap_or(file))
    }

    /// History of `name`, newest first.
    pub async fn revisions(&self, ctx: &Context, name: &str) -> GopassResult<Vec<Revision>> {
        validate_name(name)?;
        let path = self.rcs_path(ctx, name).await?;
        self.rcs.revisions(ctx, &path).await
    }

    /// Decrypted content of `name` at revision `hash`.
    pub async fn get_revision(&self, ctx: &Context, name: &str, hash: &str) -> GopassResult<Vec<u8>> {
        validate_name(name)?;
        let path = self.rcs_path(ctx, name).await?;
        let ciphertext = self.rcs.get_revision(ctx, &path, hash).await?;
        self.crypto.decrypt(ctx, &ciphertext).await
    }

    async fn commit(&self, ctx: &Context, names: &[String], message: &str) -> GopassResult<()> {
        if !self.auto_commit {
            return Ok(());
        }
        let paths = self.storage.rcs_paths(ctx, names).await?;
        self.rcs.add(ctx, &paths).await?;
        let message = ctx.commit_message.as_deref().unwrap_or(message);
        match self.rcs.commit(ctx, message).await {
            Ok(()) | Err(GopassError::NothingToCommit) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn pinned(url: &BackendUrl, sel: Selection) -> BackendUrl {
    url.clone().with_backends(sel.crypto, sel.sync, sel.storage)
}

fn parse_recipients(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
