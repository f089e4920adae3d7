use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use gopass_core::{GopassError, GopassResult};

use super::Crypto;
use crate::context::Context;

/// The `gpgmock` backend: no encryption at all. Ciphertext equals
/// plaintext, and the keyring is an in-memory set of ids.
#[derive(Debug, Default)]
pub struct PlainCrypto {
    keys: Mutex<BTreeSet<String>>,
}

impl PlainCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> Vec<String> {
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn insert(&self, id: String) {
        self.keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id);
    }
}

#[async_trait]
impl Crypto for PlainCrypto {
    async fn encrypt(&self, _ctx: &Context, plaintext: &[u8], _recipients: &[String]) -> GopassResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    async fn decrypt(&self, _ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }

    async fn recipient_ids(&self, _ctx: &Context, _ciphertext: &[u8]) -> GopassResult<Vec<String>> {
        Ok(self.keys())
    }

    fn name(&self) -> &'static str {
        "gpgmock"
    }

    fn ext(&self) -> &'static str {
        "gpg"
    }

    fn id_file(&self) -> &'static str {
        ".gpg-id"
    }

    async fn import_public_key(&self, _ctx: &Context, key: &[u8]) -> GopassResult<()> {
        let id = String::from_utf8_lossy(key).trim().to_string();
        if id.is_empty() {
            return Err(GopassError::crypto("empty public key"));
        }
        self.insert(id);
        Ok(())
    }

    async fn export_public_key(&self, _ctx: &Context, id: &str) -> GopassResult<Vec<u8>> {
        Ok(id.as_bytes().to_vec())
    }

    async fn list_public_key_ids(&self, _ctx: &Context) -> GopassResult<Vec<String>> {
        Ok(self.keys())
    }

    async fn list_private_key_ids(&self, _ctx: &Context) -> GopassResult<Vec<String>> {
        Ok(self.keys())
    }

    async fn find_public_keys(&self, _ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>> {
        Ok(needles.to_vec())
    }

    async fn find_private_keys(&self, _ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>> {
        Ok(needles.to_vec())
    }

    async fn read_names_from_key(&self, _ctx: &Context, key: &[u8]) -> GopassResult<Vec<String>> {
        Ok(vec![String::from_utf8_lossy(key).trim().to_string()])
    }

    async fn create_private_key(&self, _ctx: &Context) -> GopassResult<()> {
        Err(GopassError::not_supported("gpgmock", "create_private_key"))
    }

    async fn create_private_key_batch(
        &self,
        _ctx: &Context,
        name: &str,
        email: &str,
        _passphrase: &str,
    ) -> GopassResult<()> {
        self.insert(format!("{name} <{email}>"));
        Ok(())
    }
}
