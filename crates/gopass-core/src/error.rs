use thiserror::Error;

pub type GopassResult<T> = Result<T, GopassError>;

#[derive(Debug, Error)]
pub enum GopassError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("operation not supported by the {backend} backend: {op}")]
    NotSupported { backend: String, op: String },

    #[error("store is not initialized: {0}")]
    NotInitialized(String),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("crypto failure: {message}")]
    Crypto {
        message: String,
        /// The failure most likely came from a wrong passphrase.
        bad_passphrase: bool,
    },

    #[error("no usable recipients left to encrypt for")]
    NoRecipients,

    #[error("cache entry expired: {0}")]
    Expired(String),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("passphrase prompt failed: {0}")]
    Prompt(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GopassError {
    pub fn not_supported(backend: impl Into<String>, op: impl Into<String>) -> Self {
        GopassError::NotSupported {
            backend: backend.into(),
            op: op.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        GopassError::Crypto {
            message: message.into(),
            bad_passphrase: false,
        }
    }

    pub fn bad_passphrase(message: impl Into<String>) -> Self {
        GopassError::Crypto {
            message: message.into(),
            bad_passphrase: true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GopassError::NotFound(_))
            || matches!(self, GopassError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    pub fn is_bad_passphrase(&self) -> bool {
        matches!(
            self,
            GopassError::Crypto {
                bad_passphrase: true,
                ..
            }
        )
    }
}
