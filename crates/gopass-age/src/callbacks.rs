//! Bridges age's blocking callback interface to the async passphrase
//! callback of a [`Context`].

use gopass_backend::Context;
use secrecy::SecretString;
use tokio::runtime::Handle;

/// age callbacks used for passphrase-protected SSH keys and plugins.
/// Must only be invoked from a blocking thread (`spawn_blocking`).
#[derive(Clone)]
pub struct PromptCallbacks {
    ctx: Option<Context>,
    key: String,
    handle: Option<Handle>,
}

impl PromptCallbacks {
    /// Callbacks that ask through `ctx`, caching under `key`.
    pub fn new(ctx: &Context, key: impl Into<String>) -> Self {
        PromptCallbacks {
            ctx: Some(ctx.clone()),
            key: key.into(),
            handle: Handle::try_current().ok(),
        }
    }

    /// Same prompt channel, cached under the public key file of `private`.
    pub fn rekey(other: &Self, private: &std::path::Path) -> Self {
        PromptCallbacks {
            key: format!("{}.pub", private.display()),
            ..other.clone()
        }
    }

    /// Callbacks that never answer.
    pub fn noop() -> Self {
        PromptCallbacks {
            ctx: None,
            key: String::new(),
            handle: None,
        }
    }
}

impl age::Callbacks for PromptCallbacks {
    fn display_message(&self, message: &str) {
        tracing::info!(key = %self.key, "{message}");
    }

    fn confirm(&self, _message: &str, _yes_string: &str, _no_string: Option<&str>) -> Option<bool> {
        None
    }

    fn request_public_string(&self, _description: &str) -> Option<String> {
        None
    }

    fn request_passphrase(&self, description: &str) -> Option<SecretString> {
        let (ctx, handle) = (self.ctx.as_ref()?, self.handle.as_ref()?);
        match handle.block_on(ctx.ask_passphrase(&self.key, description, false)) {
            Ok(pw) => Some(pw),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "passphrase request failed");
                None
            }
        }
    }
}
