//! gopass-age: the `age` crypto backend.
//!
//! Identities live in a passphrase-encrypted keyring file; recipients may be
//! native X25519 keys, SSH public keys, plugin recipients or `github:<user>`
//! indirections. Decryption can be delegated to a per-user agent that keeps
//! the unlocked identities in memory.

pub mod agent;
mod callbacks;
pub mod crypto;
pub mod github;
pub mod identity;
pub mod keyring;
pub mod loader;
pub mod recipient;
pub mod ssh;

pub use callbacks::PromptCallbacks;
pub use crypto::Age;
pub use github::GithubSshCache;
pub use identity::Identity;
pub use keyring::Keyring;
pub use loader::AgeLoader;
pub use recipient::Recipient;
