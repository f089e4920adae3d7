//! age identities and decryption.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use age::armor::ArmoredReader;
use gopass_core::{GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};

use crate::callbacks::PromptCallbacks;

#[derive(Clone)]
pub enum Identity {
    X25519(age::x25519::Identity),
    Plugin(age::plugin::Identity),
    /// A passphrase; only the agent holds these.
    Scrypt(Arc<SecretString>),
}

impl Identity {
    /// Parse one `AGE-SECRET-KEY-1…` or `AGE-PLUGIN-…` line.
    pub fn parse(line: &str) -> GopassResult<Self> {
        let line = line.trim();
        if line.starts_with("AGE-SECRET-KEY-1") {
            return age::x25519::Identity::from_str(line)
                .map(Identity::X25519)
                .map_err(|e| GopassError::crypto(format!("invalid age identity: {e}")));
        }
        if line.starts_with("AGE-PLUGIN-") {
            return age::plugin::Identity::from_str(line)
                .map(Identity::Plugin)
                .map_err(|e| GopassError::crypto(format!("invalid plugin identity: {e}")));
        }
        Err(GopassError::crypto("unrecognised identity line"))
    }

    /// Parse an identity file body, skipping blanks and `#` comments.
    pub fn parse_all(text: &str) -> GopassResult<Vec<Self>> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(Identity::parse)
            .collect()
    }

    pub fn scrypt(passphrase: SecretString) -> Self {
        Identity::Scrypt(Arc::new(passphrase))
    }

    /// The secret string form. Scrypt passphrases have none.
    pub fn encode(&self) -> Option<SecretString> {
        match self {
            Identity::X25519(id) => Some(id.to_string()),
            Identity::Plugin(id) => Some(SecretString::from(id.to_string())),
            Identity::Scrypt(_) => None,
        }
    }

    /// X25519 recipient of a native identity.
    pub fn x25519_recipient(&self) -> Option<age::x25519::Recipient> {
        match self {
            Identity::X25519(id) => Some(id.to_public()),
            _ => None,
        }
    }
}

/// A private SSH key as read from disk, parsed lazily for each decrypt so
/// that encrypted keys can prompt.
#[derive(Clone)]
pub struct SshKey {
    pub path: PathBuf,
    pub pem: Arc<Vec<u8>>,
}

/// Everything needed to attempt a decryption, movable into a blocking task.
pub(crate) struct IdentitySet {
    pub native: Vec<Identity>,
    pub ssh: Vec<SshKey>,
    pub callbacks: PromptCallbacks,
}

impl IdentitySet {
    fn into_age(self) -> Vec<Box<dyn age::Identity>> {
        let mut out: Vec<Box<dyn age::Identity>> = Vec::new();
        let mut plugins: BTreeMap<String, Vec<age::plugin::Identity>> = BTreeMap::new();
        for id in self.native {
            match id {
                Identity::X25519(id) => out.push(Box::new(id)),
                Identity::Plugin(id) => plugins.entry(id.plugin().to_string()).or_default().push(id),
                Identity::Scrypt(pw) => {
                    let pw = SecretString::from(pw.expose_secret().to_string());
                    out.push(Box::new(age::scrypt::Identity::new(pw)));
                }
            }
        }
        for (name, ids) in plugins {
            match age::plugin::IdentityPluginV1::new(&name, &ids, self.callbacks.clone()) {
                Ok(p) => out.push(Box::new(p)),
                Err(e) => tracing::warn!(plugin = %name, error = %e, "age plugin unavailable"),
            }
        }
        for key in self.ssh {
            let filename = key.path.to_string_lossy().into_owned();
            match age::ssh::Identity::from_buffer(Cursor::new(key.pem.as_slice()), Some(filename)) {
                Ok(age::ssh::Identity::Unsupported(k)) => {
                    tracing::debug!(path = %key.path.display(), key = ?k, "unsupported ssh key")
                }
                Ok(id) => {
                    let cb = PromptCallbacks::rekey(&self.callbacks, &key.path);
                    out.push(Box::new(id.with_callbacks(cb)));
                }
                Err(e) => tracing::debug!(path = %key.path.display(), error = %e, "unreadable ssh key"),
            }
        }
        out
    }

    /// Blocking decryption.
    pub fn decrypt(self, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        let identities = self.into_age();
        if identities.is_empty() {
            return Err(GopassError::crypto("no identities"));
        }
        let decryptor = age::Decryptor::new(ArmoredReader::new(ciphertext)).map_err(decrypt_error)?;
        let mut reader = decryptor
            .decrypt(identities.iter().map(|i| i.as_ref() as &dyn age::Identity))
            .map_err(decrypt_error)?;
        let mut plaintext = Vec::new();
        reader.read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }
}

pub(crate) fn decrypt_error(e: age::DecryptError) -> GopassError {
    let bad_passphrase = matches!(
        e,
        age::DecryptError::DecryptionFailed | age::DecryptError::KeyDecryptionFailed
    );
    GopassError::Crypto {
        message: format!("failed to decrypt: {e}"),
        bad_passphrase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{encrypt_scrypt, encrypt_to, Recipient};
    use secrecy::ExposeSecret;

    #[test]
    fn parse_identity_file() {
        let id = age::x25519::Identity::generate();
        let text = format!("# created: today\n\n{}\n", id.to_string().expose_secret());
        let ids = Identity::parse_all(&text).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            ids[0].x25519_recipient().unwrap().to_string(),
            id.to_public().to_string()
        );
        assert!(Identity::parse_all("garbage").is_err());
    }

    #[test]
    fn x25519_roundtrip() {
        let id = age::x25519::Identity::generate();
        let r = Recipient::X25519(id.to_public());
        let ct = encrypt_to(&[r], b"hello world", PromptCallbacks::noop()).unwrap();
        let set = IdentitySet {
            native: vec![Identity::X25519(id)],
            ssh: vec![],
            callbacks: PromptCallbacks::noop(),
        };
        assert_eq!(set.decrypt(&ct).unwrap(), b"hello world");
    }

    #[test]
    fn scrypt_roundtrip_and_wrong_passphrase() {
        let ct = encrypt_scrypt(b"hello", SecretString::from("test".to_string()), Some(10)).unwrap();
        let good = IdentitySet {
            native: vec![Identity::scrypt(SecretString::from("test".to_string()))],
            ssh: vec![],
            callbacks: PromptCallbacks::noop(),
        };
        assert_eq!(good.decrypt(&ct).unwrap(), b"hello");

        let bad = IdentitySet {
            native: vec![Identity::scrypt(SecretString::from("nope".to_string()))],
            ssh: vec![],
            callbacks: PromptCallbacks::noop(),
        };
        let err = bad.decrypt(&ct).unwrap_err();
        assert!(matches!(err, GopassError::Crypto { .. }));
    }

    #[test]
    fn empty_set_fails() {
        let set = IdentitySet {
            native: vec![],
            ssh: vec![],
            callbacks: PromptCallbacks::noop(),
        };
        let err = set.decrypt(b"whatever").unwrap_err();
        assert!(err.to_string().contains("no identities"));
    }
}
