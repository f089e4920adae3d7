//! Passphrase prompting for gopass.
//!
//! [`Askpass`] answers from an in-memory TTL cache when it can and otherwise
//! asks the user through pinentry, falling back to a terminal prompt.

pub mod askpass;
pub mod pinentry;
pub mod terminal;

pub use askpass::Askpass;
pub use pinentry::{Pinentry, Request};
