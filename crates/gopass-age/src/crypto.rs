//! The `age` crypto backend.

use std::sync::Arc;

use async_trait::async_trait;
use gopass_backend::{Context, Crypto};
use gopass_core::config::GopassConfig;
use gopass_core::{GopassError, GopassResult};

#[cfg(unix)]
use crate::agent::AgentClient;
use crate::callbacks::PromptCallbacks;
use crate::github::GithubSshCache;
use crate::keyring::Keyring;
use crate::recipient::{dedup, encrypt_to, Recipient};

pub const NAME: &str = "age";
pub const EXT: &str = "age";
pub const ID_FILE: &str = ".age-recipients";
/// Recipient file name used by older stores.
pub const LEGACY_ID_FILE: &str = ".age-ids";

const GITHUB_PREFIX: &str = "github:";
const PLUGIN_KEY: &str = "age-plugin";

pub struct Age {
    keyring: Arc<Keyring>,
    github: Arc<GithubSshCache>,
    #[cfg(unix)]
    agent: Option<AgentClient>,
}

impl Age {
    pub fn new(keyring: Keyring, github: GithubSshCache) -> Self {
        Age {
            keyring: Arc::new(keyring),
            github: Arc::new(github),
            #[cfg(unix)]
            agent: None,
        }
    }

    pub fn from_config(cfg: &GopassConfig) -> GopassResult<Self> {
        let age = Age::new(
            Keyring::from_config(&cfg.age, &cfg.cache),
            GithubSshCache::new(&cfg.github)?,
        );
        #[cfg(unix)]
        let age = if cfg.age.use_agent {
            age.with_agent(AgentClient::from_config(&cfg.age))
        } else {
            age
        };
        Ok(age)
    }

    /// Route decryption through the agent behind `client`.
    #[cfg(unix)]
    pub fn with_agent(mut self, client: AgentClient) -> Self {
        self.agent = Some(client);
        self
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Turn search strings into recipients. Anything unparsable is logged
    /// and dropped.
    pub async fn resolve_recipients(&self, ctx: &Context, search: &[String]) -> Vec<Recipient> {
        let mut out = Vec::new();
        for s in search {
            let s = s.trim();
            if let Some(user) = s.strip_prefix(GITHUB_PREFIX) {
                out.extend(self.github_recipients(ctx, user).await);
                continue;
            }
            if !(s.starts_with("age1") || s.starts_with("ssh-")) {
                tracing::debug!(recipient = s, "ignoring unsupported recipient");
                continue;
            }
            match Recipient::parse(s) {
                Ok(r) => out.push(r),
                Err(e) => tracing::warn!(recipient = s, error = %e, "skipping recipient"),
            }
        }
        out
    }

    async fn github_recipients(&self, ctx: &Context, user: &str) -> Vec<Recipient> {
        if ctx.no_network {
            tracing::debug!(user, "network disabled, skipping github recipient");
            return Vec::new();
        }
        let keys = match self.github.list_keys(ctx, user).await {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(user, error = %e, "failed to fetch github keys");
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|line| match Recipient::parse(line) {
                Ok(r @ Recipient::Ssh(_)) => Some(r),
                Ok(_) | Err(_) => {
                    tracing::debug!(user, key = %line, "skipping github key");
                    None
                }
            })
            .collect()
    }

    async fn decrypt_local(&self, ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        let set = self.keyring.identity_set(ctx).await?;
        let ciphertext = ciphertext.to_vec();
        tokio::task::spawn_blocking(move || set.decrypt(&ciphertext))
            .await
            .map_err(|e| GopassError::Other(anyhow::anyhow!("decrypt task failed: {e}")))?
    }

    #[cfg(unix)]
    async fn decrypt_agent(&self, ctx: &Context, agent: &AgentClient, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        agent.ensure_running(ctx).await?;
        match agent.decrypt(ctx, ciphertext).await {
            Err(GopassError::Agent(msg)) if msg.ends_with("no identities") => {
                tracing::debug!("loading identities into the age agent");
                let ids = self.keyring.identities(ctx).await?;
                agent.identities(ctx, &ids).await?;
                agent.decrypt(ctx, ciphertext).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Crypto for Age {
    async fn encrypt(&self, ctx: &Context, plaintext: &[u8], recipients: &[String]) -> GopassResult<Vec<u8>> {
        let mut all = self.resolve_recipients(ctx, recipients).await;
        all.extend(self.keyring.identity_recipients(ctx).await?);
        let all = dedup(all);
        if all.is_empty() {
            return Err(GopassError::NoRecipients);
        }
        tracing::debug!(recipients = ?all, "encrypting");

        let callbacks = PromptCallbacks::new(ctx, PLUGIN_KEY);
        let plaintext = plaintext.to_vec();
        tokio::task::spawn_blocking(move || encrypt_to(&all, &plaintext, callbacks))
            .await
            .map_err(|e| GopassError::Other(anyhow::anyhow!("encrypt task failed: {e}")))?
    }

    async fn decrypt(&self, ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        #[cfg(unix)]
        {
            if let Some(agent) = &self.agent {
                match self.decrypt_agent(ctx, agent, ciphertext).await {
                    Ok(pt) => return Ok(pt),
                    Err(e) => tracing::debug!(error = %e, "agent decrypt failed, decrypting locally"),
                }
            }
        }
        self.decrypt_local(ctx, ciphertext).await
    }

    async fn recipient_ids(&self, _ctx: &Context, _ciphertext: &[u8]) -> GopassResult<Vec<String>> {
        Err(GopassError::not_supported(NAME, "recipient_ids"))
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn ext(&self) -> &'static str {
        EXT
    }

    fn id_file(&self) -> &'static str {
        ID_FILE
    }

    /// Recipients need no import; the key is only checked for validity.
    async fn import_public_key(&self, _ctx: &Context, key: &[u8]) -> GopassResult<()> {
        let text = std::str::from_utf8(key).map_err(|_| GopassError::crypto("public key is not UTF-8"))?;
        Recipient::parse(text).map(drop)
    }

    async fn export_public_key(&self, _ctx: &Context, id: &str) -> GopassResult<Vec<u8>> {
        Ok(id.as_bytes().to_vec())
    }

    async fn list_public_key_ids(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        self.keyring.list_identities(ctx).await
    }

    async fn list_private_key_ids(&self, ctx: &Context) -> GopassResult<Vec<String>> {
        self.keyring.list_identities(ctx).await
    }

    async fn find_public_keys(&self, _ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>> {
        Ok(needles
            .iter()
            .filter(|n| Recipient::parse(n).is_ok())
            .cloned()
            .collect())
    }

    async fn find_private_keys(&self, ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>> {
        self.keyring.find_identities(ctx, needles).await
    }

    async fn create_private_key(&self, ctx: &Context) -> GopassResult<()> {
        self.keyring.generate_identity(ctx, None).await.map(drop)
    }

    async fn create_private_key_batch(
        &self,
        ctx: &Context,
        _name: &str,
        _email: &str,
        passphrase: &str,
    ) -> GopassResult<()> {
        self.keyring.generate_identity(ctx, Some(passphrase)).await.map(drop)
    }

    fn format_key(&self, id: &str) -> String {
        let mut parts = id.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(kind), Some(blob)) if kind.starts_with("ssh-") && blob.is_ascii() && blob.len() > 16 => {
                format!("{kind} …{}", &blob[blob.len() - 16..])
            }
            _ => id.to_string(),
        }
    }
}
