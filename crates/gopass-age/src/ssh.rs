//! Discovery of SSH key pairs usable as age identities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::identity::SshKey;
use crate::recipient::Recipient;

/// Scan `dir` for `*.pub` files with a private key of the same basename.
/// Keyed by the canonical recipient string of the public half.
pub async fn scan(dir: &Path) -> BTreeMap<String, SshKey> {
    let mut found = BTreeMap::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "no ssh directory");
            return found;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "ssh directory scan aborted");
                break;
            }
        };
        let pub_path = entry.path();
        if pub_path.extension().and_then(|e| e.to_str()) != Some("pub") {
            continue;
        }
        match load_pair(&pub_path).await {
            Some((recipient, key)) => {
                found.insert(recipient, key);
            }
            None => tracing::trace!(path = %pub_path.display(), "skipping ssh key"),
        }
    }
    tracing::debug!(dir = %dir.display(), keys = found.len(), "ssh identities loaded");
    found
}

async fn load_pair(pub_path: &Path) -> Option<(String, SshKey)> {
    let line = tokio::fs::read_to_string(pub_path).await.ok()?;
    let recipient = Recipient::parse(line.lines().next()?).ok()?.canonical()?;
    let private: PathBuf = pub_path.with_extension("");
    let pem = tokio::fs::read(&private).await.ok()?;
    Some((
        recipient,
        SshKey {
            path: private,
            pem: Arc::new(pem),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUB: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPhDm1yi1kZrj/DmnLDutcN6MlOIEBTRc7vF/xeS5CKP alice@rust\n";

    #[tokio::test]
    async fn pairs_public_and_private() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("id_ed25519.pub"), PUB).unwrap();
        std::fs::write(dir.path().join("id_ed25519"), "private").unwrap();
        // public half without a private key
        std::fs::write(dir.path().join("orphan.pub"), PUB).unwrap();
        std::fs::write(dir.path().join("known_hosts"), "x").unwrap();

        let keys = scan(dir.path()).await;
        assert_eq!(keys.len(), 1);
        let (recipient, key) = keys.iter().next().unwrap();
        assert!(recipient.starts_with("ssh-ed25519 "));
        assert_eq!(key.path, dir.path().join("id_ed25519"));
    }

    #[tokio::test]
    async fn missing_dir_is_empty() {
        assert!(scan(Path::new("/nonexistent/ssh")).await.is_empty());
    }
}
