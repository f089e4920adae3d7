//! Per-user directories.
//!
//! Resolution order for every directory:
//!   1. `$GOPASS_HOMEDIR` (a fake home, used by tests and portable installs)
//!   2. the XDG variable (`XDG_CONFIG_HOME`, `XDG_CACHE_HOME`, `XDG_DATA_HOME`,
//!      `XDG_RUNTIME_DIR`) on non-Windows, `APPDATA` / `LOCALAPPDATA` on Windows
//!   3. the platform default below the real home directory

use std::path::PathBuf;

const APP_NAME: &str = "gopass";

/// Which directory family to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Config,
    Cache,
    Data,
    Runtime,
}

/// Configuration directory, e.g. `~/.config/gopass`.
pub fn user_config() -> PathBuf {
    resolve(Kind::Config, &env_lookup)
}

/// Cache directory, e.g. `~/.cache/gopass`.
pub fn user_cache() -> PathBuf {
    resolve(Kind::Cache, &env_lookup)
}

/// Data directory, e.g. `~/.local/share/gopass`.
pub fn user_data() -> PathBuf {
    resolve(Kind::Data, &env_lookup)
}

/// Runtime directory for sockets, e.g. `$XDG_RUNTIME_DIR`.
///
/// Not suffixed with the app name; callers prefix their own file names.
/// Falls back to the cache directory when no runtime directory is known.
pub fn user_runtime() -> PathBuf {
    resolve(Kind::Runtime, &env_lookup)
}

/// The user's home, honouring `$GOPASS_HOMEDIR`.
pub fn user_home() -> PathBuf {
    home(&env_lookup)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn home(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(h) = lookup("GOPASS_HOMEDIR") {
        return PathBuf::from(h);
    }
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

fn resolve(kind: Kind, lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(h) = lookup("GOPASS_HOMEDIR") {
        let base = PathBuf::from(h);
        return match kind {
            Kind::Config => base.join(".config").join(APP_NAME),
            Kind::Cache => base.join(".cache").join(APP_NAME),
            Kind::Data => base.join(".local").join("share").join(APP_NAME),
            Kind::Runtime => base.join(".cache").join(APP_NAME),
        };
    }

    if cfg!(windows) {
        return resolve_windows(kind, lookup);
    }

    let home = home(lookup);
    match kind {
        Kind::Config => lookup("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"))
            .join(APP_NAME),
        Kind::Cache => lookup("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".cache"))
            .join(APP_NAME),
        Kind::Data => lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local").join("share"))
            .join(APP_NAME),
        Kind::Runtime => lookup("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| resolve(Kind::Cache, lookup)),
    }
}

fn resolve_windows(kind: Kind, lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    let home = home(lookup);
    let roaming = lookup("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("AppData").join("Roaming"));
    let local = lookup("LOCALAPPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("AppData").join("Local"));
    match kind {
        Kind::Config => roaming.join(APP_NAME),
        Kind::Cache | Kind::Runtime => local.join(APP_NAME),
        Kind::Data => local.join(APP_NAME).join("data"),
    }
}
