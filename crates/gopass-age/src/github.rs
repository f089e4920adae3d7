//! Public SSH keys of GitHub users, cached on disk.

use std::time::Duration;

use gopass_backend::Context;
use gopass_core::cache::OnDiskCache;
use gopass_core::config::GithubConfig;
use gopass_core::{GopassError, GopassResult};

pub const CACHE_NAME: &str = "github-ssh";

pub struct GithubSshCache {
    client: reqwest::Client,
    base_url: String,
    cache: OnDiskCache,
}

impl GithubSshCache {
    pub fn new(cfg: &GithubConfig) -> GopassResult<Self> {
        Self::with_cache(
            cfg,
            OnDiskCache::new(CACHE_NAME, Duration::from_secs(cfg.cache_ttl_secs)),
        )
    }

    pub fn with_cache(cfg: &GithubConfig, cache: OnDiskCache) -> GopassResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("gopass/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GopassError::Other(anyhow::anyhow!("building http client: {e}")))?;
        Ok(GithubSshCache {
            client,
            base_url: cfg.keys_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// SSH public key lines of `user`. Served from disk within the TTL;
    /// empty answers are never cached.
    pub async fn list_keys(&self, ctx: &Context, user: &str) -> GopassResult<Vec<String>> {
        match self.cache.get(user).await {
            Ok(keys) if !keys.is_empty() => {
                tracing::debug!(user, keys = keys.len(), "github keys from cache");
                return Ok(keys);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::debug!(user, error = %e, "github key cache miss"),
        }

        let keys = self.fetch(ctx, user).await?;
        if keys.is_empty() {
            return Ok(keys);
        }
        if let Err(e) = self.cache.set(user, &keys).await {
            tracing::warn!(user, error = %e, "failed to cache github keys");
        }
        Ok(keys)
    }

    async fn fetch(&self, ctx: &Context, user: &str) -> GopassResult<Vec<String>> {
        let url = format!("{}/{}.keys", self.base_url, encode_user(user));
        tracing::debug!(%url, "fetching github keys");

        let body = ctx
            .run("github key fetch", async {
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| GopassError::Other(anyhow::anyhow!("GET {url}: {e}")))?;
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(GopassError::NotFound(format!("github user {user}")));
                }
                if !status.is_success() {
                    return Err(GopassError::Other(anyhow::anyhow!("GET {url}: HTTP {status}")));
                }
                resp.text()
                    .await
                    .map_err(|e| GopassError::Other(anyhow::anyhow!("reading {url}: {e}")))
            })
            .await?;

        Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

fn encode_user(user: &str) -> String {
    user.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
