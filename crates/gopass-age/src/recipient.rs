//! age recipients of mixed kinds and their encryption.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use gopass_core::{GopassError, GopassResult};

use crate::callbacks::PromptCallbacks;

#[derive(Clone)]
pub enum Recipient {
    X25519(age::x25519::Recipient),
    Ssh(age::ssh::Recipient),
    /// Handled by an `age-plugin-*` binary. `encoding` is the string the
    /// user gave us; it is not a canonical X25519 recipient.
    Plugin {
        recipient: age::plugin::Recipient,
        encoding: String,
    },
}

impl Recipient {
    /// Parse an `age1…` or `ssh-…` recipient.
    pub fn parse(s: &str) -> GopassResult<Self> {
        let s = s.trim();
        if s.starts_with("age1") {
            if let Ok(r) = age::x25519::Recipient::from_str(s) {
                return Ok(Recipient::X25519(r));
            }
            return age::plugin::Recipient::from_str(s)
                .map(|recipient| Recipient::Plugin {
                    recipient,
                    encoding: s.to_string(),
                })
                .map_err(|e| GopassError::crypto(format!("invalid age recipient: {e}")));
        }
        if s.starts_with("ssh-") {
            return age::ssh::Recipient::from_str(s)
                .map(Recipient::Ssh)
                .map_err(|e| GopassError::crypto(format!("invalid ssh recipient: {e:?}")));
        }
        Err(GopassError::crypto(format!("unsupported recipient {s:?}")))
    }

    /// The canonical string form, if this kind has one.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Recipient::X25519(r) => Some(r.to_string()),
            Recipient::Ssh(r) => Some(r.to_string()),
            Recipient::Plugin { .. } => None,
        }
    }

    /// A string that parses back to this recipient.
    pub fn encoding(&self) -> String {
        match self {
            Recipient::Plugin { encoding, .. } => encoding.clone(),
            other => other.canonical().unwrap_or_default(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoding())
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::X25519(_) => write!(f, "X25519({self})"),
            Recipient::Ssh(_) => write!(f, "Ssh({self})"),
            Recipient::Plugin { recipient, .. } => write!(f, "Plugin({}: {self})", recipient.plugin()),
        }
    }
}

/// Drop repeats of stringable recipients; plugin recipients are all kept.
/// First occurrence wins, order is otherwise preserved.
pub fn dedup(recipients: Vec<Recipient>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| match r.canonical() {
            Some(s) => seen.insert(s),
            None => true,
        })
        .collect()
}

/// Encrypt `plaintext` to every recipient. Blocking: plugin recipients
/// spawn their plugin binary.
pub(crate) fn encrypt_to(
    recipients: &[Recipient],
    plaintext: &[u8],
    callbacks: PromptCallbacks,
) -> GopassResult<Vec<u8>> {
    if recipients.is_empty() {
        return Err(GopassError::NoRecipients);
    }

    let mut boxed: Vec<Box<dyn age::Recipient>> = Vec::new();
    let mut plugins: BTreeMap<String, Vec<age::plugin::Recipient>> = BTreeMap::new();
    for r in recipients {
        match r {
            Recipient::X25519(r) => boxed.push(Box::new(r.clone())),
            Recipient::Ssh(r) => boxed.push(Box::new(r.clone())),
            Recipient::Plugin { recipient, .. } => plugins
                .entry(recipient.plugin().to_string())
                .or_default()
                .push(recipient.clone()),
        }
    }
    for (name, recs) in plugins {
        let plugin = age::plugin::RecipientPluginV1::new(&name, &recs, &[], callbacks.clone())
            .map_err(|e| GopassError::crypto(format!("age plugin {name}: {e}")))?;
        boxed.push(Box::new(plugin));
    }

    let encryptor = age::Encryptor::with_recipients(boxed.iter().map(|r| r.as_ref() as &dyn age::Recipient))
        .map_err(|e| GopassError::crypto(format!("preparing encryption: {e}")))?;
    seal(encryptor, plaintext)
}

/// Encrypt under a passphrase.
pub(crate) fn encrypt_scrypt(
    plaintext: &[u8],
    passphrase: secrecy::SecretString,
    work_factor: Option<u8>,
) -> GopassResult<Vec<u8>> {
    let mut recipient = age::scrypt::Recipient::new(passphrase);
    if let Some(wf) = work_factor {
        recipient.set_work_factor(wf);
    }
    let encryptor = age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
        .map_err(|e| GopassError::crypto(format!("preparing encryption: {e}")))?;
    seal(encryptor, plaintext)
}

fn seal(encryptor: age::Encryptor, plaintext: &[u8]) -> GopassResult<Vec<u8>> {
    let mut out = Vec::with_capacity(plaintext.len() + 256);
    let mut writer = encryptor.wrap_output(&mut out)?;
    writer.write_all(plaintext)?;
    writer.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSH_ED25519: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPhDm1yi1kZrj/DmnLDutcN6MlOIEBTRc7vF/xeS5CKP alice@rust";

    fn x25519() -> String {
        age::x25519::Identity::generate().to_public().to_string()
    }

    #[test]
    fn parses_kinds() {
        assert!(matches!(Recipient::parse(&x25519()).unwrap(), Recipient::X25519(_)));
        assert!(matches!(Recipient::parse(SSH_ED25519).unwrap(), Recipient::Ssh(_)));
        assert!(Recipient::parse("github:alice").is_err());
        assert!(Recipient::parse("age1notbech32").is_err());
    }

    #[test]
    fn ssh_canonical_drops_comment() {
        let r = Recipient::parse(SSH_ED25519).unwrap();
        let canon = r.canonical().unwrap();
        assert!(canon.starts_with("ssh-ed25519 AAAA"));
        assert!(!canon.contains("alice@rust"));
    }

    #[test]
    fn dedup_stringable() {
        let a = x25519();
        let b = x25519();
        let list: Vec<Recipient> = [&a, &a, &b, &b]
            .iter()
            .map(|s| Recipient::parse(s).unwrap())
            .collect();
        let out: Vec<String> = dedup(list).iter().map(|r| r.to_string()).collect();
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn empty_set_is_refused() {
        let err = encrypt_to(&[], b"x", PromptCallbacks::noop()).unwrap_err();
        assert!(matches!(err, GopassError::NoRecipients));
    }
}
