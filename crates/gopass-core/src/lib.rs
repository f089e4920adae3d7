//! gopass-core: shared error types, configuration, user directories,
//! caches and logging bootstrap.

pub mod appdir;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod umask;

pub use error::{GopassError, GopassResult};
