//! Per-call options threaded through every backend operation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use gopass_core::{GopassError, GopassResult};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::id::{CryptoBackend, StorageBackend, SyncBackend};

/// Asks for the passphrase of `key`. `reason` is shown to the user; `repeat`
/// requests confirmation by double entry.
pub type PassphraseCallback =
    Arc<dyn Fn(String, String, bool) -> BoxFuture<'static, GopassResult<SecretString>> + Send + Sync>;

/// Invoked when a cached passphrase for `key` is known to be wrong.
pub type PurgeCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Context {
    pub crypto_backend: Option<CryptoBackend>,
    pub sync_backend: Option<SyncBackend>,
    pub storage_backend: Option<StorageBackend>,
    pub passphrase: Option<PassphraseCallback>,
    pub purge_passphrase: Option<PurgeCallback>,
    pub always_trust: bool,
    pub use_cache: bool,
    /// Skip non-native identities (SSH keys) when listing.
    pub only_native: bool,
    /// Never touch the network (GitHub key lookups).
    pub no_network: bool,
    pub commit_message: Option<String>,
    /// Deadline for network and agent I/O.
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            crypto_backend: None,
            sync_backend: None,
            storage_backend: None,
            passphrase: None,
            purge_passphrase: None,
            always_trust: false,
            use_cache: true,
            only_native: false,
            no_network: false,
            commit_message: None,
            timeout: DEFAULT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("crypto_backend", &self.crypto_backend)
            .field("sync_backend", &self.sync_backend)
            .field("storage_backend", &self.storage_backend)
            .field("passphrase", &self.passphrase.is_some())
            .field("always_trust", &self.always_trust)
            .field("use_cache", &self.use_cache)
            .field("only_native", &self.only_native)
            .field("no_network", &self.no_network)
            .field("commit_message", &self.commit_message)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn with_crypto_backend(mut self, id: CryptoBackend) -> Self {
        self.crypto_backend = Some(id);
        self
    }

    pub fn with_sync_backend(mut self, id: SyncBackend) -> Self {
        self.sync_backend = Some(id);
        self
    }

    pub fn with_storage_backend(mut self, id: StorageBackend) -> Self {
        self.storage_backend = Some(id);
        self
    }

    pub fn with_passphrase_callback(mut self, cb: PassphraseCallback) -> Self {
        self.passphrase = Some(cb);
        self
    }

    /// Convenience for tests and batch use: always answer with `pw`.
    pub fn with_static_passphrase(self, pw: &str) -> Self {
        let pw = pw.to_string();
        self.with_passphrase_callback(Arc::new(move |_key, _reason, _repeat| {
            let pw = pw.clone();
            Box::pin(async move { Ok(SecretString::from(pw)) })
        }))
    }

    pub fn with_purge_callback(mut self, cb: PurgeCallback) -> Self {
        self.purge_passphrase = Some(cb);
        self
    }

    pub fn with_always_trust(mut self, on: bool) -> Self {
        self.always_trust = on;
        self
    }

    pub fn with_use_cache(mut self, on: bool) -> Self {
        self.use_cache = on;
        self
    }

    pub fn with_only_native(mut self, on: bool) -> Self {
        self.only_native = on;
        self
    }

    pub fn with_no_network(mut self, on: bool) -> Self {
        self.no_network = on;
        self
    }

    pub fn with_commit_message(mut self, msg: impl Into<String>) -> Self {
        self.commit_message = Some(msg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A context that is cancelled along with this one.
    pub fn child(&self) -> Self {
        let mut ctx = self.clone();
        ctx.cancel = self.cancel.child_token();
        ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask for a passphrase through the installed callback.
    pub async fn ask_passphrase(
        &self,
        key: &str,
        reason: &str,
        repeat: bool,
    ) -> GopassResult<SecretString> {
        let cb = self
            .passphrase
            .as_ref()
            .ok_or_else(|| GopassError::Prompt("no passphrase callback installed".into()))?;
        cb(key.to_string(), reason.to_string(), repeat).await
    }

    pub fn purge_passphrase(&self, key: &str) {
        if let Some(cb) = &self.purge_passphrase {
            cb(key);
        }
    }

    /// Run `fut` under this context's deadline and cancellation token.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> GopassResult<T>
    where
        F: Future<Output = GopassResult<T>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GopassError::Cancelled(what.to_string())),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(GopassError::Cancelled(format!(
                    "{what}: timed out after {:?}",
                    self.timeout
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() {
        let ctx = Context::default();
        assert!(ctx.use_cache);
        assert!(!ctx.only_native);
        assert_eq!(ctx.timeout, Duration::from_secs(30));
        assert!(ctx.crypto_backend.is_none());
    }

    #[tokio::test]
    async fn static_passphrase() {
        let ctx = Context::default().with_static_passphrase("test");
        let pw = ctx.ask_passphrase("k", "why", false).await.unwrap();
        assert_eq!(pw.expose_secret(), "test");
    }

    #[tokio::test]
    async fn missing_callback_is_prompt_error() {
        let err = Context::default()
            .ask_passphrase("k", "why", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GopassError::Prompt(_)));
    }

    #[tokio::test]
    async fn run_times_out() {
        let ctx = Context::default().with_timeout(Duration::from_millis(20));
        let err = ctx
            .run("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GopassError::Cancelled(_)));
    }

    #[tokio::test]
    async fn child_follows_parent_cancel() {
        let ctx = Context::default();
        let child = ctx.child();
        ctx.cancel.cancel();
        assert!(child.is_cancelled());
        let err = child.run("noop", async { Ok(1) }).await;
        // either branch may win once cancelled; a cancelled token never yields a timeout
        if let Err(e) = err {
            assert!(matches!(e, GopassError::Cancelled(_)));
        }
    }
}
