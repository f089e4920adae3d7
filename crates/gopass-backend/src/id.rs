//! Backend identifiers and their canonical names.

use std::fmt;
use std::hash::Hash;

/// Common surface of the three identifier enums, used by the registry.
pub trait BackendId:
    Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Canonical lowercase token used in backend URLs.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CryptoBackend {
    GpgMock,
    #[default]
    GpgCli,
    Age,
    OpenPgp,
    Xc,
    /// Token did not name a known backend.
    Unknown,
}

impl CryptoBackend {
    pub const KNOWN: [CryptoBackend; 5] = [
        CryptoBackend::GpgMock,
        CryptoBackend::GpgCli,
        CryptoBackend::Age,
        CryptoBackend::OpenPgp,
        CryptoBackend::Xc,
    ];

    /// Lenient parse: unknown tokens become `Unknown`.
    pub fn from_token(token: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|b| b.name() == token)
            .unwrap_or(CryptoBackend::Unknown)
    }
}

impl BackendId for CryptoBackend {
    fn name(&self) -> &'static str {
        match self {
            CryptoBackend::GpgMock => "gpgmock",
            CryptoBackend::GpgCli => "gpgcli",
            CryptoBackend::Age => "age",
            CryptoBackend::OpenPgp => "openpgp",
            CryptoBackend::Xc => "xc",
            CryptoBackend::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SyncBackend {
    GitMock,
    #[default]
    GitCli,
    GoGit,
    /// Token did not name a known backend.
    Unknown,
}

impl SyncBackend {
    pub const KNOWN: [SyncBackend; 3] = [SyncBackend::GitMock, SyncBackend::GitCli, SyncBackend::GoGit];

    /// Lenient parse: unknown tokens become `Unknown`.
    pub fn from_token(token: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|b| b.name() == token)
            .unwrap_or(SyncBackend::Unknown)
    }
}

impl BackendId for SyncBackend {
    fn name(&self) -> &'static str {
        match self {
            SyncBackend::GitMock => "gitmock",
            SyncBackend::GitCli => "gitcli",
            SyncBackend::GoGit => "gogit",
            SyncBackend::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum StorageBackend {
    #[default]
    Fs,
    KvMock,
    CryptFs,
}

impl StorageBackend {
    pub const KNOWN: [StorageBackend; 3] = [
        StorageBackend::Fs,
        StorageBackend::KvMock,
        StorageBackend::CryptFs,
    ];

    /// Lenient parse: unknown tokens fall back to `Fs`.
    pub fn from_token(token: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|b| b.name() == token)
            .unwrap_or(StorageBackend::Fs)
    }
}

impl BackendId for StorageBackend {
    fn name(&self) -> &'static str {
        match self {
            StorageBackend::Fs => "fs",
            StorageBackend::KvMock => "kvmock",
            StorageBackend::CryptFs => "cryptfs",
        }
    }
}

impl fmt::Display for CryptoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for SyncBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
