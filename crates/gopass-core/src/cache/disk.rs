//! Named on-disk cache of string lists under `<user_cache>/<name>/`.
//!
//! One file per key; values are stored `\n`-joined. Entry age is the file's
//! mtime, which callers also use for invalidation against a source file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;

use crate::error::{GopassError, GopassResult};

pub struct OnDiskCache {
    name: String,
    dir: PathBuf,
    ttl: Duration,
}

impl OnDiskCache {
    /// Cache rooted at `<user_cache>/<name>`.
    pub fn new(name: &str, ttl: Duration) -> Self {
        Self::with_dir(name, crate::appdir::user_cache().join(name), ttl)
    }

    /// Cache rooted at an explicit directory.
    pub fn with_dir(name: &str, dir: PathBuf, ttl: Duration) -> Self {
        OnDiskCache {
            name: name.to_string(),
            dir,
            ttl,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> GopassResult<PathBuf> {
        Ok(self.dir.join(self.file_for(key)?))
    }

    fn file_for(&self, key: &str) -> GopassResult<String> {
        let file = sanitize_key(key);
        if file.is_empty() || file == "." || file == ".." {
            return Err(GopassError::InvalidName {
                name: key.to_string(),
                reason: "cache key is empty after sanitizing".into(),
            });
        }
        Ok(file)
    }

    /// Cached values for `key`. Fails with `NotFound` on a miss and with
    /// `Expired` when the entry is older than the TTL.
    pub async fn get(&self, key: &str) -> GopassResult<Vec<String>> {
        let path = self.path_for(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GopassError::NotFound(format!("{}/{key}", self.name)));
            }
            Err(e) => return Err(e.into()),
        };

        let mtime = meta.modified()?;
        let age = SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            return Err(GopassError::Expired(format!("{}/{key}", self.name)));
        }

        let content = fs::read_to_string(&path).await?;
        Ok(content
            .split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Store `values` under `key`, replacing any previous entry.
    pub async fn set(&self, key: &str, values: &[String]) -> GopassResult<()> {
        let file = self.file_for(key)?;
        let path = self.dir.join(&file);
        fs::create_dir_all(&self.dir).await?;

        // sanitized keys never start with '_'
        let tmp = self.dir.join(format!("_{file}.tmp"));
        fs::write(&tmp, values.join("\n")).await?;
        set_mode(&tmp, 0o644).await?;
        fs::rename(&tmp, &path).await?;

        tracing::trace!(cache = %self.name, key, entries = values.len(), "cache entry written");
        Ok(())
    }

    /// Remove `key`. Missing entries are not an error.
    pub async fn remove(&self, key: &str) -> GopassResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Modification time of the stored entry.
    pub async fn mod_time(&self, key: &str) -> GopassResult<SystemTime> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(m) => Ok(m.modified()?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GopassError::NotFound(format!("{}/{key}", self.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the whole cache directory.
    pub async fn purge(&self) -> GopassResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a key onto a safe file name: everything outside `[A-Za-z0-9@.-_]`
/// becomes `_`, then leading/trailing `_` and spaces are trimmed.
pub fn sanitize_key(key: &str) -> String {
    let replaced: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim_matches(|c| c == '_' || c == ' ').to_string()
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
