//! OpenDAL-backed storage: `fs` on a local directory, `kvmock` in memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gopass_core::{umask, GopassError, GopassResult};
use opendal::Operator;
use tokio::sync::Mutex;

use super::Storage;
use crate::context::Context;
use crate::name::{dir_prefix, matches_prefix, validate_name};

pub struct OpendalStorage {
    op: Operator,
    kind: &'static str,
    root: Option<PathBuf>,
    // writers serialize; readers go straight to the operator
    write_lock: Mutex<()>,
}

impl OpendalStorage {
    /// Filesystem storage rooted at `root`, created if missing.
    pub fn fs(root: &Path) -> GopassResult<Self> {
        std::fs::create_dir_all(root)?;
        let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
        let op = Operator::new(builder)
            .map_err(|e| io_err("creating fs operator", e))?
            .layer(opendal::layers::LoggingLayer::default())
            .finish();
        Ok(OpendalStorage {
            op,
            kind: "fs",
            root: Some(root.to_path_buf()),
            write_lock: Mutex::new(()),
        })
    }

    /// Volatile in-memory storage.
    pub fn memory() -> GopassResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| io_err("creating memory operator", e))?
            .layer(opendal::layers::LoggingLayer::default())
            .finish();
        Ok(OpendalStorage {
            op,
            kind: "kvmock",
            root: None,
            write_lock: Mutex::new(()),
        })
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    async fn all_files(&self) -> GopassResult<Vec<String>> {
        let entries = match self.op.list_with("/").recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("listing storage", e)),
        };
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|e| e.metadata().mode().is_file())
            .map(|e| e.path().trim_start_matches('/').to_string())
            .filter(|p| !in_hidden_dir(p))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    #[cfg(unix)]
    async fn apply_mode(&self, name: &str) -> GopassResult<()> {
        use std::os::unix::fs::PermissionsExt;
        if let Some(root) = &self.root {
            let perms = std::fs::Permissions::from_mode(umask::mode(0o644));
            tokio::fs::set_permissions(root.join(name), perms).await?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn apply_mode(&self, _name: &str) -> GopassResult<()> {
        Ok(())
    }
}

/// Metadata directories such as `.git/` are not entries.
fn in_hidden_dir(path: &str) -> bool {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts.iter().any(|c| c.starts_with('.'))
}

fn io_err(what: &str, e: opendal::Error) -> GopassError {
    tracing::debug!(error = %e, "{what}");
    GopassError::Io(e.into())
}

fn map_err(name: &str, e: opendal::Error) -> GopassError {
    if e.kind() == opendal::ErrorKind::NotFound {
        GopassError::NotFound(name.to_string())
    } else {
        io_err(name, e)
    }
}

#[async_trait]
impl Storage for OpendalStorage {
    async fn get(&self, _ctx: &Context, name: &str) -> GopassResult<Vec<u8>> {
        validate_name(name)?;
        let buf = self.op.read(name).await.map_err(|e| map_err(name, e))?;
        Ok(buf.to_vec())
    }

    async fn set(&self, _ctx: &Context, name: &str, value: &[u8]) -> GopassResult<()> {
        validate_name(name)?;
        let _guard = self.write_lock.lock().await;
        self.op
            .write(name, value.to_vec())
            .await
            .map_err(|e| map_err(name, e))?;
        self.apply_mode(name).await?;
        tracing::trace!(storage = self.kind, name, bytes = value.len(), "entry written");
        Ok(())
    }

    async fn delete(&self, _ctx: &Context, name: &str) -> GopassResult<()> {
        validate_name(name)?;
        let _guard = self.write_lock.lock().await;
        if !self.op.exists(name).await.map_err(|e| map_err(name, e))? {
            return Err(GopassError::NotFound(name.to_string()));
        }
        self.op.delete(name).await.map_err(|e| map_err(name, e))?;
        Ok(())
    }

    async fn exists(&self, _ctx: &Context, name: &str) -> GopassResult<bool> {
        validate_name(name)?;
        self.op.exists(name).await.map_err(|e| map_err(name, e))
    }

    async fn list(&self, _ctx: &Context, prefix: &str) -> GopassResult<Vec<String>> {
        Ok(self
            .all_files()
            .await?
            .into_iter()
            .filter(|n| matches_prefix(n, prefix))
            .collect())
    }

    async fn is_dir(&self, _ctx: &Context, name: &str) -> GopassResult<bool> {
        let dir = dir_prefix(name);
        Ok(self.all_files().await?.iter().any(|n| n.starts_with(&dir)))
    }

    async fn prune(&self, _ctx: &Context, prefix: &str) -> GopassResult<()> {
        let dir = dir_prefix(prefix);
        let _guard = self.write_lock.lock().await;
        let doomed: Vec<String> = self
            .all_files()
            .await?
            .into_iter()
            .filter(|n| n.starts_with(&dir))
            .collect();
        if doomed.is_empty() {
            return Err(GopassError::NotFound(prefix.to_string()));
        }
        for name in &doomed {
            self.op.delete(name).await.map_err(|e| map_err(name, e))?;
        }
        tracing::debug!(storage = self.kind, prefix, removed = doomed.len(), "pruned");
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.kind
    }

    fn path(&self) -> String {
        self.root
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
