//! gopass-store: a password store assembled from registered backends.
//!
//! [`Store`] ties one crypto, one sync and one storage backend together.
//! [`select`] decides which ones a URL gets when it does not name them.

mod backends;
mod store;

pub use backends::{register_default_backends, select, Selection};
pub use store::Store;
