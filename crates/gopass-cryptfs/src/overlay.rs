//! Filename-hiding overlay.
//!
//! Entries are stored under `sha256(name)` in the wrapped storage. The
//! name table lives next to them in `.gopass-mapping.age`, encrypted for the
//! store's recipients. Values are passed through untouched: callers hand in
//! ciphertext and get ciphertext back.
//!
//! The recipient file, the legacy `.age-ids` and root-level git files are
//! store metadata and bypass the mapping. Any other name is hashed, dotted
//! or not. Rewriting the recipient file re-encrypts the mapping for the new
//! recipients.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gopass_backend::name::{dir_prefix, matches_prefix, validate_name};
use gopass_backend::{Context, Crypto, FsckReport, Storage};
use gopass_core::{GopassError, GopassResult};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const MAPPING_FILE: &str = ".gopass-mapping.age";

type Mappings = BTreeMap<String, String>;

/// Blob name of `name`.
pub fn hash_name(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

fn is_blob(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

const LEGACY_ID_FILE: &str = ".age-ids";

pub struct Cryptfs {
    inner: Arc<dyn Storage>,
    crypto: Arc<dyn Crypto>,
    mappings: Mutex<Mappings>,
}

impl Cryptfs {
    /// Wrap `inner`, loading the name table if there is one.
    pub async fn open(ctx: &Context, inner: Arc<dyn Storage>, crypto: Arc<dyn Crypto>) -> GopassResult<Self> {
        let mappings = if inner.exists(ctx, MAPPING_FILE).await? {
            let ciphertext = inner.get(ctx, MAPPING_FILE).await?;
            let json = crypto.decrypt(ctx, &ciphertext).await?;
            serde_json::from_slice(&json).map_err(std::io::Error::from)?
        } else {
            Mappings::new()
        };
        debug!(entries = mappings.len(), path = %inner.path(), "cryptfs mapping loaded");
        Ok(Cryptfs {
            inner,
            crypto,
            mappings: Mutex::new(mappings),
        })
    }

    /// Like [`Cryptfs::open`], also writing the name table when the store
    /// already has recipients. Otherwise it is written together with the
    /// recipient file.
    pub async fn init(ctx: &Context, inner: Arc<dyn Storage>, crypto: Arc<dyn Crypto>) -> GopassResult<Self> {
        let fs = Self::open(ctx, inner, crypto).await?;
        if fs.inner.exists(ctx, fs.crypto.id_file()).await? {
            let map = fs.mappings.lock().await;
            fs.persist(ctx, &map).await?;
        } else {
            debug!("no recipients yet, mapping follows the recipient file");
        }
        Ok(fs)
    }

    pub fn inner(&self) -> &Arc<dyn Storage> {
        &self.inner
    }

    /// Names stored verbatim in the inner storage.
    fn is_metadata(&self, name: &str) -> bool {
        if name.contains('/') {
            return false;
        }
        if name == self.crypto.id_file() || name == LEGACY_ID_FILE {
            return true;
        }
        let entry_suffix = format!(".{}", self.crypto.ext());
        name.starts_with(".git") && !name.ends_with(&entry_suffix)
    }

    /// Re-encrypt the name table after the recipient file changed. Without
    /// recipients the old table is left alone.
    async fn reencrypt(&self, ctx: &Context) -> GopassResult<()> {
        let map = self.mappings.lock().await;
        match self.persist(ctx, &map).await {
            Ok(()) => Ok(()),
            Err(GopassError::NoRecipients) => {
                warn!("recipient file is empty, mapping left unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn recipients(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        let raw = match self.inner.get(ctx, self.crypto.id_file()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Err(GopassError::NoRecipients),
            Err(e) => return Err(e),
        };
        let recipients: Vec<String> = String::from_utf8_lossy(&raw)
            .split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect();
        if recipients.is_empty() {
            return Err(GopassError::NoRecipients);
        }
        Ok(recipients)
    }

    async fn persist(&self, ctx: &Context, map: &Mappings) -> GopassResult<()> {
        let json = serde_json::to_vec_pretty(map).map_err(std::io::Error::from)?;
        let recipients = self.recipients(ctx).await?;
        let ciphertext = self.crypto.encrypt(ctx, &json, &recipients).await?;
        self.inner.set(ctx, MAPPING_FILE, &ciphertext).await?;
        debug!(entries = map.len(), "cryptfs mapping persisted");
        Ok(())
    }

    async fn blobs(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        Ok(self
            .inner
            .list(ctx, "")
            .await?
            .into_iter()
            .filter(|n| is_blob(n))
            .collect())
    }

    async fn collect_orphans(&self, ctx: &Context, map: &Mappings) -> GopassResult<Vec<String>> {
        let referenced: std::collections::HashSet<&str> = map.values().map(String::as_str).collect();
        Ok(self
            .blobs(ctx)
            .await?
            .into_iter()
            .filter(|b| !referenced.contains(b.as_str()))
            .collect())
    }
}

#[async_trait]
impl Storage for Cryptfs {
    async fn get(&self, ctx: &Context, name: &str) -> GopassResult<Vec<u8>> {
        if self.is_metadata(name) {
            return self.inner.get(ctx, name).await;
        }
        let hash = self
            .mappings
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| GopassError::NotFound(name.to_string()))?;
        self.inner.get(ctx, &hash).await
    }

    async fn set(&self, ctx: &Context, name: &str, value: &[u8]) -> GopassResult<()> {
        if self.is_metadata(name) {
            self.inner.set(ctx, name, value).await?;
            if name == self.crypto.id_file() {
                self.reencrypt(ctx).await?;
            }
            return Ok(());
        }
        validate_name(name)?;

        let mut map = self.mappings.lock().await;
        let fresh = !map.contains_key(name);
        let hash = map.get(name).cloned().unwrap_or_else(|| hash_name(name));
        self.inner.set(ctx, &hash, value).await?;
        if !fresh {
            return Ok(());
        }

        map.insert(name.to_string(), hash);
        if let Err(e) = self.persist(ctx, &map).await {
            map.remove(name);
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context, name: &str) -> GopassResult<()> {
        if self.is_metadata(name) {
            return self.inner.delete(ctx, name).await;
        }
        let mut map = self.mappings.lock().await;
        let hash = map
            .remove(name)
            .ok_or_else(|| GopassError::NotFound(name.to_string()))?;
        if let Err(e) = self.persist(ctx, &map).await {
            map.insert(name.to_string(), hash);
            return Err(e);
        }
        match self.inner.delete(ctx, &hash).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => warn!(name, "cryptfs blob was already gone"),
            Err(e) => warn!(name, error = %e, "blob left behind after delete"),
        }
        Ok(())
    }

    async fn exists(&self, ctx: &Context, name: &str) -> GopassResult<bool> {
        if self.is_metadata(name) {
            return self.inner.exists(ctx, name).await;
        }
        Ok(self.mappings.lock().await.contains_key(name))
    }

    async fn list(&self, _ctx: &Context, prefix: &str) -> GopassResult<Vec<String>> {
        Ok(self
            .mappings
            .lock()
            .await
            .keys()
            .filter(|n| matches_prefix(n, prefix))
            .cloned()
            .collect())
    }

    async fn is_dir(&self, _ctx: &Context, name: &str) -> GopassResult<bool> {
        let dir = dir_prefix(name);
        let map = self.mappings.lock().await;
        if dir.is_empty() {
            return Ok(!map.is_empty());
        }
        Ok(map.keys().any(|k| k.starts_with(&dir)))
    }

    /// Collect unreferenced blobs, then remove every entry under `prefix/`.
    async fn prune(&self, ctx: &Context, prefix: &str) -> GopassResult<()> {
        let mut map = self.mappings.lock().await;

        for orphan in self.collect_orphans(ctx, &map).await? {
            match self.inner.delete(ctx, &orphan).await {
                Ok(()) => debug!(blob = %orphan, "removed orphaned blob"),
                Err(e) => warn!(blob = %orphan, error = %e, "failed to remove orphaned blob"),
            }
        }

        let dir = dir_prefix(prefix);
        let doomed: Vec<(String, String)> = map
            .iter()
            .filter(|(k, _)| k.starts_with(&dir))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if doomed.is_empty() {
            return Err(GopassError::NotFound(prefix.to_string()));
        }
        for (name, _) in &doomed {
            map.remove(name);
        }
        if let Err(e) = self.persist(ctx, &map).await {
            map.extend(doomed);
            return Err(e);
        }
        for (name, hash) in &doomed {
            match self.inner.delete(ctx, hash).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(name = %name, error = %e, "blob left behind after prune"),
            }
        }
        debug!(prefix, removed = doomed.len(), "cryptfs pruned");
        Ok(())
    }

    async fn rename(&self, ctx: &Context, from: &str, to: &str, delete: bool) -> GopassResult<()> {
        validate_name(to)?;
        let mut map = self.mappings.lock().await;
        let from_hash = map
            .get(from)
            .cloned()
            .ok_or_else(|| GopassError::NotFound(from.to_string()))?;
        if map.contains_key(to) {
            return Err(GopassError::AlreadyExists(to.to_string()));
        }

        let to_hash = hash_name(to);
        let value = self.inner.get(ctx, &from_hash).await?;
        self.inner.set(ctx, &to_hash, &value).await?;

        map.insert(to.to_string(), to_hash);
        if delete {
            map.remove(from);
        }
        if let Err(e) = self.persist(ctx, &map).await {
            map.remove(to);
            if delete {
                map.insert(from.to_string(), from_hash);
            }
            return Err(e);
        }

        if delete {
            if let Err(e) = self.inner.delete(ctx, &from_hash).await {
                warn!(from, error = %e, "old blob left behind after move");
            }
        }
        Ok(())
    }

    /// Blob names of `names` plus the mapping file.
    async fn rcs_paths(&self, _ctx: &Context, names: &[String]) -> GopassResult<Vec<String>> {
        let mut out: Vec<String> = names
            .iter()
            .map(|n| if self.is_metadata(n) { n.clone() } else { hash_name(n) })
            .collect();
        out.push(MAPPING_FILE.to_string());
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn fsck(&self, ctx: &Context) -> GopassResult<FsckReport> {
        let map = self.mappings.lock().await;
        let orphaned = self.collect_orphans(ctx, &map).await?;
        let mut missing = Vec::new();
        for (name, hash) in map.iter() {
            if !self.inner.exists(ctx, hash).await? {
                missing.push(name.clone());
            }
        }
        Ok(FsckReport { orphaned, missing })
    }

    fn name(&self) -> &'static str {
        "cryptfs"
    }

    fn path(&self) -> String {
        self.inner.path()
    }
}
