//! The per-user age identity keyring.
//!
//! `<user_config>/age/identities` holds every native identity, one per
//! line, encrypted under a passphrase (scrypt). The recipients derived from
//! it are cached in plain text; the cache is only trusted while its mtime is
//! not older than the identities file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gopass_backend::Context;
use gopass_core::cache::OnDiskCache;
use gopass_core::config::{AgeConfig, CacheConfig};
use gopass_core::{appdir, GopassError, GopassResult};
use gopass_pinentry::Askpass;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;

use crate::callbacks::PromptCallbacks;
use crate::identity::{Identity, IdentitySet, SshKey};
use crate::recipient::{encrypt_scrypt, Recipient};

pub const RECIPIENT_CACHE: &str = "age-identity-recipients";
const RECIPIENT_CACHE_KEY: &str = "identity";
const RECIPIENT_CACHE_TTL: Duration = Duration::from_secs(30 * 3600);
/// Passphrase cache key of the identities file.
pub const PASSPHRASE_KEY: &str = "age-keyring";

pub struct Keyring {
    file: PathBuf,
    recipients: OnDiskCache,
    ssh_dir: PathBuf,
    ssh_keys: OnceCell<BTreeMap<String, SshKey>>,
    work_factor: Option<u8>,
    askpass: Arc<Askpass>,
}

impl Keyring {
    /// The user's keyring as configured.
    pub fn from_config(age: &AgeConfig, cache: &CacheConfig) -> Self {
        Keyring {
            file: appdir::user_config().join("age").join("identities"),
            recipients: OnDiskCache::new(RECIPIENT_CACHE, RECIPIENT_CACHE_TTL),
            ssh_dir: age
                .ssh_dir
                .clone()
                .unwrap_or_else(|| appdir::user_home().join(".ssh")),
            ssh_keys: OnceCell::new(),
            work_factor: age.scrypt_work_factor,
            askpass: Arc::new(Askpass::from_config(cache)),
        }
    }

    /// A keyring whose files all live below `base`.
    pub fn in_dir(base: &Path, askpass: Arc<Askpass>) -> Self {
        Keyring {
            file: base.join("config").join("age").join("identities"),
            recipients: OnDiskCache::with_dir(
                RECIPIENT_CACHE,
                base.join("cache").join(RECIPIENT_CACHE),
                RECIPIENT_CACHE_TTL,
            ),
            ssh_dir: base.join("ssh"),
            ssh_keys: OnceCell::new(),
            work_factor: None,
            askpass,
        }
    }

    pub fn with_work_factor(mut self, wf: Option<u8>) -> Self {
        self.work_factor = wf;
        self
    }

    pub fn with_ssh_dir(mut self, dir: PathBuf) -> Self {
        self.ssh_dir = dir;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    async fn passphrase(&self, ctx: &Context, reason: &str, repeat: bool) -> GopassResult<SecretString> {
        if ctx.passphrase.is_some() {
            return ctx.ask_passphrase(PASSPHRASE_KEY, reason, repeat).await;
        }
        self.askpass.passphrase(PASSPHRASE_KEY, reason, repeat).await
    }

    fn forget_passphrase(&self, ctx: &Context) {
        ctx.purge_passphrase(PASSPHRASE_KEY);
        self.askpass.remove(PASSPHRASE_KEY);
    }

    /// Every native identity. A missing file is an empty keyring.
    pub async fn identities(&self, ctx: &Context) -> GopassResult<Vec<Identity>> {
        let data = match tokio::fs::read(&self.file).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(file = %self.file.display(), "no age identities yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let pw = self
            .passphrase(ctx, "Unlock your age identities", false)
            .await?;
        let set = IdentitySet {
            native: vec![Identity::scrypt(pw)],
            ssh: Vec::new(),
            callbacks: PromptCallbacks::noop(),
        };
        let plaintext = match tokio::task::spawn_blocking(move || set.decrypt(&data))
            .await
            .map_err(|e| GopassError::Other(anyhow::anyhow!("decrypt task failed: {e}")))?
        {
            Ok(p) => p,
            Err(e) => {
                if e.is_bad_passphrase() {
                    self.forget_passphrase(ctx);
                }
                return Err(e);
            }
        };

        let text = String::from_utf8(plaintext)
            .map_err(|_| GopassError::crypto("identities file is not valid UTF-8"))?;
        Identity::parse_all(&text)
    }

    async fn cached_recipients(&self) -> Option<Vec<String>> {
        let source = tokio::fs::metadata(&self.file).await.ok()?.modified().ok()?;
        let cached = self.recipients.mod_time(RECIPIENT_CACHE_KEY).await.ok()?;
        if cached < source {
            tracing::debug!("identity recipient cache is stale");
            return None;
        }
        match self.recipients.get(RECIPIENT_CACHE_KEY).await {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::debug!(error = %e, "identity recipient cache miss");
                None
            }
        }
    }

    /// X25519 recipients of the native identities.
    pub async fn identity_recipients(&self, ctx: &Context) -> GopassResult<Vec<Recipient>> {
        if let Some(list) = self.cached_recipients().await {
            let parsed: Vec<Recipient> = list
                .iter()
                .filter_map(|s| Recipient::parse(s).ok())
                .collect();
            if parsed.len() == list.len() {
                return Ok(parsed);
            }
            tracing::debug!("identity recipient cache is corrupt, rebuilding");
        }

        let recipients: Vec<Recipient> = self
            .identities(ctx)
            .await?
            .iter()
            .filter_map(Identity::x25519_recipient)
            .map(Recipient::X25519)
            .collect();
        let encoded: Vec<String> = recipients.iter().map(Recipient::encoding).collect();
        if let Err(e) = self.recipients.set(RECIPIENT_CACHE_KEY, &encoded).await {
            tracing::warn!(error = %e, "failed to write identity recipient cache");
        }
        Ok(recipients)
    }

    /// Append a fresh X25519 identity and return its recipient.
    pub async fn generate_identity(&self, ctx: &Context, passphrase: Option<&str>) -> GopassResult<String> {
        let ctx = match passphrase.filter(|p| !p.is_empty()) {
            Some(pw) => ctx.clone().with_static_passphrase(pw),
            None => ctx.clone(),
        };
        let mut ids = self.identities(&ctx).await?;
        let new_file = ids.is_empty();
        let fresh = age::x25519::Identity::generate();
        let recipient = fresh.to_public().to_string();
        ids.push(Identity::X25519(fresh));
        self.save_identities(&ctx, &ids, new_file).await?;
        tracing::info!(recipient = %recipient, "generated age identity");
        Ok(recipient)
    }

    /// Encrypt and write `ids`, replacing the identities file atomically.
    pub async fn save_identities(&self, ctx: &Context, ids: &[Identity], new_file: bool) -> GopassResult<()> {
        let dir = self
            .file
            .parent()
            .ok_or_else(|| GopassError::Config("identities file has no parent".into()))?;
        tokio::fs::create_dir_all(dir).await?;
        set_mode(dir, 0o700).await?;

        let body = ids
            .iter()
            .filter_map(Identity::encode)
            .map(|s| s.expose_secret().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let reason = if new_file {
            "Choose a passphrase for your age identities"
        } else {
            "Unlock your age identities"
        };
        let pw = self.passphrase(ctx, reason, new_file).await?;
        let wf = self.work_factor;
        let ciphertext = tokio::task::spawn_blocking(move || encrypt_scrypt(body.as_bytes(), pw, wf))
            .await
            .map_err(|e| GopassError::Other(anyhow::anyhow!("encrypt task failed: {e}")))??;

        let tmp = dir.join(".identities.tmp");
        {
            use tokio::io::AsyncWriteExt;
            let mut f = tokio::fs::File::create(&tmp).await?;
            set_mode(&tmp, 0o600).await?;
            f.write_all(&ciphertext).await?;
            f.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &self.file).await?;

        if let Err(e) = self.recipients.remove(RECIPIENT_CACHE_KEY).await {
            tracing::debug!(error = %e, "failed to drop identity recipient cache");
        }
        tracing::debug!(file = %self.file.display(), count = ids.len(), "saved age identities");
        Ok(())
    }

    pub async fn ssh_keys(&self) -> &BTreeMap<String, SshKey> {
        self.ssh_keys
            .get_or_init(|| crate::ssh::scan(&self.ssh_dir))
            .await
    }

    /// Recipient strings of every identity, sorted. SSH keys are left out
    /// when the context asks for native identities only.
    pub async fn list_identities(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        let mut out: Vec<String> = self
            .identity_recipients(ctx)
            .await?
            .iter()
            .map(Recipient::encoding)
            .collect();
        if !ctx.only_native {
            out.extend(self.ssh_keys().await.keys().cloned());
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// The subset of `keys` that are recipients of our own identities.
    pub async fn find_identities(&self, ctx: &Context, keys: &[String]) -> GopassResult<Vec<String>> {
        let ours = self.list_identities(ctx).await?;
        Ok(keys
            .iter()
            .filter(|k| {
                let canon = Recipient::parse(k)
                    .ok()
                    .and_then(|r| r.canonical())
                    .unwrap_or_else(|| k.trim().to_string());
                ours.contains(&canon)
            })
            .cloned()
            .collect())
    }

    /// Native and SSH identities ready for a decryption attempt.
    pub(crate) async fn identity_set(&self, ctx: &Context) -> GopassResult<IdentitySet> {
        let native = self.identities(ctx).await?;
        let ssh = if ctx.only_native {
            Vec::new()
        } else {
            self.ssh_keys().await.values().cloned().collect()
        };
        Ok(IdentitySet {
            native,
            ssh,
            callbacks: PromptCallbacks::new(ctx, PASSPHRASE_KEY),
        })
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyring(dir: &Path) -> Keyring {
        let askpass = Arc::new(
            Askpass::new(Duration::from_secs(60), Duration::from_secs(60)).with_pinentry(None),
        );
        Keyring::in_dir(dir, askpass).with_work_factor(Some(10))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let kr = keyring(dir.path());
        let ctx = Context::default();
        assert!(kr.identities(&ctx).await.unwrap().is_empty());
        assert!(kr.identity_recipients(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn generate_appends_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let kr = keyring(dir.path());
        let ctx = Context::default().with_static_passphrase("test");

        let first = kr.generate_identity(&ctx, None).await.unwrap();
        let second = kr.generate_identity(&ctx, None).await.unwrap();
        assert_ne!(first, second);

        let ids = kr.identities(&ctx).await.unwrap();
        assert_eq!(ids.len(), 2);

        let recips: Vec<String> = kr
            .identity_recipients(&ctx)
            .await
            .unwrap()
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(recips, vec![first.clone(), second.clone()]);

        // served from the cache now, even with a wrong passphrase
        let wrong = Context::default().with_static_passphrase("wrong");
        assert_eq!(kr.identity_recipients(&wrong).await.unwrap().len(), 2);

        let found = kr
            .find_identities(&ctx, &[first.clone(), "age1unknown".into()])
            .await
            .unwrap();
        assert_eq!(found, vec![first]);
    }

    #[tokio::test]
    async fn wrong_passphrase_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let kr = keyring(dir.path());
        kr.generate_identity(&Context::default(), Some("test"))
            .await
            .unwrap();
        let err = kr
            .identities(&Context::default().with_static_passphrase("nope"))
            .await
            .err().unwrap();
        assert!(matches!(err, GopassError::Crypto { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_modes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let kr = keyring(dir.path());
        kr.generate_identity(&Context::default(), Some("test"))
            .await
            .unwrap();
        let file = std::fs::metadata(kr.file()).unwrap().permissions().mode();
        let parent = std::fs::metadata(kr.file().parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file & 0o777, 0o600);
        assert_eq!(parent & 0o777, 0o700);
    }

    #[tokio::test]
    async fn only_native_hides_ssh() {
        let dir = tempfile::tempdir().unwrap();
        let ssh = dir.path().join("ssh");
        std::fs::create_dir_all(&ssh).unwrap();
        std::fs::write(
            ssh.join("id_ed25519.pub"),
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPhDm1yi1kZrj/DmnLDutcN6MlOIEBTRc7vF/xeS5CKP alice@rust\n",
        )
        .unwrap();
        std::fs::write(ssh.join("id_ed25519"), "private").unwrap();
        let kr = keyring(dir.path());
        let ctx = Context::default().with_static_passphrase("test");
        kr.generate_identity(&ctx, None).await.unwrap();

        assert_eq!(kr.list_identities(&ctx).await.unwrap().len(), 2);
        let native = ctx.clone().with_only_native(true);
        assert_eq!(kr.list_identities(&native).await.unwrap().len(), 1);
    }
}
