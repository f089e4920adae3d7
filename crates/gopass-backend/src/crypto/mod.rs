//! Crypto contract: encryption for a recipient set plus keyring access.
//!
//! Recipient ids are opaque strings whose format belongs to the backend.

mod plain;

pub use plain::PlainCrypto;

use async_trait::async_trait;
use gopass_core::{GopassError, GopassResult};

use crate::context::Context;

#[async_trait]
pub trait Crypto: Send + Sync {
    async fn encrypt(&self, ctx: &Context, plaintext: &[u8], recipients: &[String]) -> GopassResult<Vec<u8>>;

    async fn decrypt(&self, ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<u8>>;

    /// Key ids embedded in a ciphertext header. Backends that hide them
    /// return `NotSupported`.
    async fn recipient_ids(&self, ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<String>>;

    fn name(&self) -> &'static str;

    /// File extension of encrypted entries, without the dot.
    fn ext(&self) -> &'static str;

    /// Name of the per-store recipient list file.
    fn id_file(&self) -> &'static str;

    async fn import_public_key(&self, ctx: &Context, key: &[u8]) -> GopassResult<()>;

    async fn export_public_key(&self, ctx: &Context, id: &str) -> GopassResult<Vec<u8>>;

    async fn list_public_key_ids(&self, ctx: &Context) -> GopassResult<Vec<String>>;

    async fn list_private_key_ids(&self, ctx: &Context) -> GopassResult<Vec<String>>;

    /// The subset of `needles` that names known public keys.
    async fn find_public_keys(&self, ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>>;

    /// The subset of `needles` that names keys we can decrypt with.
    async fn find_private_keys(&self, ctx: &Context, needles: &[String]) -> GopassResult<Vec<String>>;

    /// Human-readable owner names found in a serialized public key.
    async fn read_names_from_key(&self, _ctx: &Context, _key: &[u8]) -> GopassResult<Vec<String>> {
        Err(GopassError::not_supported(self.name(), "read_names_from_key"))
    }

    async fn create_private_key(&self, ctx: &Context) -> GopassResult<()>;

    /// Non-interactive key creation.
    async fn create_private_key_batch(
        &self,
        ctx: &Context,
        name: &str,
        email: &str,
        passphrase: &str,
    ) -> GopassResult<()>;

    /// One-line description of key `id` for listings.
    fn format_key(&self, id: &str) -> String {
        id.to_string()
    }
}
