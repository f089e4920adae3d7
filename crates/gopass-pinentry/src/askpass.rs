//! Cached passphrase prompt: TTL cache, then pinentry, then the terminal.

use std::sync::Arc;
use std::time::Duration;

use gopass_backend::context::{PassphraseCallback, PurgeCallback};
use gopass_core::cache::InMemTtl;
use gopass_core::config::CacheConfig;
use gopass_core::{GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};

use crate::pinentry::{Pinentry, Request};
use crate::terminal;

pub struct Askpass {
    cache: InMemTtl<String, Arc<SecretString>>,
    pinentry: Option<Pinentry>,
}

impl Askpass {
    /// Uses the pinentry found on this system, if any.
    pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
        Askpass {
            cache: InMemTtl::new(ttl, max_ttl),
            pinentry: Pinentry::find(),
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(cfg.passphrase_ttl_secs),
            Duration::from_secs(cfg.passphrase_max_ttl_secs),
        )
    }

    pub fn with_pinentry(mut self, pinentry: Option<Pinentry>) -> Self {
        self.pinentry = pinentry;
        self
    }

    /// Passphrase for `key`: cached value, else a fresh prompt whose answer
    /// is cached.
    pub async fn passphrase(&self, key: &str, reason: &str, repeat: bool) -> GopassResult<SecretString> {
        if let Some(hit) = self.cache.get(&key.to_string()) {
            tracing::trace!(key, "passphrase cache hit");
            return Ok(copy(&hit));
        }

        let pw = match &self.pinentry {
            Some(p) => match p.get_pin(&Request::new(reason, repeat)).await {
                Ok(pw) => pw,
                Err(GopassError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(program = %p.program().display(), "pinentry missing, using terminal");
                    terminal::prompt(reason, repeat).await?
                }
                Err(e) => return Err(e),
            },
            None => terminal::prompt(reason, repeat).await?,
        };

        tracing::debug!(
            key,
            passphrase = gopass_core::logging::secret(pw.expose_secret()),
            "passphrase obtained"
        );
        self.cache.set(key.to_string(), Arc::new(copy(&pw)));
        Ok(pw)
    }

    /// Seed the cache, e.g. from a passphrase supplied on the command line.
    pub fn store(&self, key: &str, pw: SecretString) {
        self.cache.set(key.to_string(), Arc::new(pw));
    }

    pub fn remove(&self, key: &str) {
        self.cache.remove(&key.to_string());
    }

    /// Forget every cached passphrase.
    pub fn lock(&self) {
        self.cache.purge();
        tracing::debug!("passphrase cache locked");
    }

    pub fn callback(self: &Arc<Self>) -> PassphraseCallback {
        let me = Arc::clone(self);
        Arc::new(move |key, reason, repeat| {
            let me = Arc::clone(&me);
            Box::pin(async move { me.passphrase(&key, &reason, repeat).await })
        })
    }

    pub fn purge_callback(self: &Arc<Self>) -> PurgeCallback {
        let me = Arc::clone(self);
        Arc::new(move |key| me.remove(key))
    }
}

fn copy(pw: &SecretString) -> SecretString {
    SecretString::from(pw.expose_secret().to_string())
}
