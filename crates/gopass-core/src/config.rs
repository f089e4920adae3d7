use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GopassError, GopassResult};

/// Top-level configuration (loaded from `<user_config>/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GopassConfig {
    pub log: LogConfig,
    pub cache: CacheConfig,
    pub age: AgeConfig,
    pub github: GithubConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Sliding TTL of cached passphrases in seconds (default: 3600)
    pub passphrase_ttl_secs: u64,
    /// Absolute lifetime of a cached passphrase in seconds (default: 86400)
    pub passphrase_max_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeConfig {
    /// Route decryption through the age agent
    pub use_agent: bool,
    /// Agent socket path (default: <user_runtime>/gopass-age-agent.sock)
    pub agent_socket: Option<PathBuf>,
    /// Agent binary spawned on demand (default: gopass-age-agent from $PATH)
    pub agent_binary: Option<PathBuf>,
    /// Directory scanned for SSH identities (default: ~/.ssh)
    pub ssh_dir: Option<PathBuf>,
    /// scrypt work factor (log2 N) for the identities file
    pub scrypt_work_factor: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Base URL serving `<user>.keys`
    pub keys_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Cache TTL in seconds
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend URL of the root store
    pub path: Option<String>,
    /// Commit to the sync backend after every mutation
    pub auto_commit: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            passphrase_ttl_secs: 3600,
            passphrase_max_ttl_secs: 24 * 3600,
        }
    }
}

impl Default for AgeConfig {
    fn default() -> Self {
        Self {
            use_agent: false,
            agent_socket: None,
            agent_binary: None,
            ssh_dir: None,
            scrypt_work_factor: None,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            keys_url: "https://github.com".into(),
            timeout_secs: 30,
            cache_ttl_secs: 6 * 3600,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            auto_commit: true,
        }
    }
}

/// Default config file location, overridable with `$GOPASS_CONFIG`.
pub fn default_config_path() -> PathBuf {
    std::env::var("GOPASS_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| crate::appdir::user_config().join("config.toml"))
}

impl GopassConfig {
    /// Load the config file, or defaults if it does not exist.
    pub async fn load(path: &Path) -> GopassResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| GopassError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[cache]
passphrase_ttl_secs = 60
passphrase_max_ttl_secs = 600

[age]
use_agent = true
agent_socket = "/tmp/agent.sock"
ssh_dir = "/home/user/.ssh"
scrypt_work_factor = 12

[github]
keys_url = "http://127.0.0.1:9000"
timeout_secs = 5

[store]
path = "age-gitcli-cryptfs+file:///home/user/.password-store"
auto_commit = false
"#;
        let config: GopassConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.cache.passphrase_ttl_secs, 60);
        assert!(config.age.use_agent);
        assert_eq!(config.age.agent_socket, Some(PathBuf::from("/tmp/agent.sock")));
        assert_eq!(config.age.scrypt_work_factor, Some(12));
        assert_eq!(config.github.keys_url, "http://127.0.0.1:9000");
        // Not set: default
        assert_eq!(config.github.cache_ttl_secs, 6 * 3600);
        assert!(!config.store.auto_commit);
    }

    #[test]
    fn test_parse_defaults() {
        let config: GopassConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "warn");
        assert_eq!(config.cache.passphrase_ttl_secs, 3600);
        assert_eq!(config.cache.passphrase_max_ttl_secs, 86400);
        assert!(!config.age.use_agent);
        assert_eq!(config.github.keys_url, "https://github.com");
        assert_eq!(config.github.timeout_secs, 30);
        assert!(config.store.auto_commit);
        assert!(config.store.path.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GopassConfig::load(&dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(config.log.level, "warn");
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\npassphrase_ttl_secs = ").unwrap();
        let err = GopassConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, GopassError::Config(_)));
    }
}
