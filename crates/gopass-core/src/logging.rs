//! Logging bootstrap.
//!
//! `RUST_LOG` wins when set. Otherwise the level comes from the config file,
//! raised to `debug` by `GOPASS_DEBUG`. `GOPASS_DEBUG_LOG` sends output to a
//! file, `GOPASS_DEBUG_FUNCS` / `GOPASS_DEBUG_FILES` narrow debug and trace
//! events to matching module paths / source files.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::LogConfig;

/// Debug switches read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugSettings {
    pub enabled: bool,
    pub log_file: Option<PathBuf>,
    pub log_secrets: bool,
    pub funcs: Vec<String>,
    pub files: Vec<String>,
}

impl DebugSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| !matches!(v.trim(), "" | "0" | "false" | "off"))
                .unwrap_or(false)
        };
        let list = |key: &str| {
            lookup(key)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        let log_file = lookup("GOPASS_DEBUG_LOG")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        DebugSettings {
            // a debug log file implies debug output
            enabled: flag("GOPASS_DEBUG") || log_file.is_some(),
            log_file,
            log_secrets: flag("GOPASS_DEBUG_LOG_SECRETS"),
            funcs: list("GOPASS_DEBUG_FUNCS"),
            files: list("GOPASS_DEBUG_FILES"),
        }
    }

    /// Whether a debug/trace event from `module` in `file` passes the
    /// `GOPASS_DEBUG_FUNCS` / `GOPASS_DEBUG_FILES` selectors.
    pub fn selects(&self, module: Option<&str>, file: Option<&str>) -> bool {
        let func_ok = self.funcs.is_empty()
            || module.is_some_and(|m| self.funcs.iter().any(|f| m.contains(f.as_str())));
        let file_ok = self.files.is_empty()
            || file.is_some_and(|p| self.files.iter().any(|f| p.contains(f.as_str())));
        func_ok && file_ok
    }
}

static LOG_SECRETS: OnceLock<bool> = OnceLock::new();

/// Whether secret material may appear in log output.
pub fn log_secrets() -> bool {
    *LOG_SECRETS.get_or_init(|| DebugSettings::from_env().log_secrets)
}

/// Returns `value` when `GOPASS_DEBUG_LOG_SECRETS` is set, a placeholder
/// otherwise.
pub fn secret(value: &str) -> &str {
    redact(value, log_secrets())
}

fn redact(value: &str, reveal: bool) -> &str {
    if reveal {
        value
    } else {
        "<redacted>"
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(config: &LogConfig) {
    use tracing::Level;
    use tracing_subscriber::{
        filter::filter_fn, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
        util::SubscriberInitExt, EnvFilter, Layer,
    };

    let settings = DebugSettings::from_env();
    let level = if settings.enabled {
        "debug"
    } else {
        config.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &settings.log_file {
        Some(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => BoxMakeWriter::new(std::sync::Mutex::new(file)),
            Err(e) => {
                eprintln!("gopass: cannot open debug log {}: {e}", path.display());
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let selector = settings.clone();
    let selected = filter_fn(move |meta| {
        *meta.level() <= Level::INFO || selector.selects(meta.module_path(), meta.file())
    });

    let layer = if config.format == "json" {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_writer(writer).boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer.with_filter(selected))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> DebugSettings {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        DebugSettings::from_lookup(&|k| map.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn debug_flag_values() {
        assert!(settings(&[("GOPASS_DEBUG", "true")]).enabled);
        assert!(settings(&[("GOPASS_DEBUG", "1")]).enabled);
        assert!(!settings(&[("GOPASS_DEBUG", "false")]).enabled);
        assert!(!settings(&[]).enabled);
    }

    #[test]
    fn log_file_implies_debug() {
        let s = settings(&[("GOPASS_DEBUG_LOG", "/tmp/gopass.log")]);
        assert!(s.enabled);
        assert_eq!(s.log_file, Some(PathBuf::from("/tmp/gopass.log")));
    }

    #[test]
    fn selectors() {
        let s = settings(&[
            ("GOPASS_DEBUG_FUNCS", "cryptfs, keyring"),
            ("GOPASS_DEBUG_FILES", ""),
        ]);
        assert_eq!(s.funcs, vec!["cryptfs", "keyring"]);
        assert!(s.files.is_empty());
        assert!(s.selects(Some("gopass_cryptfs::overlay"), Some("src/overlay.rs")));
        assert!(!s.selects(Some("gopass_store::store"), None));
        assert!(settings(&[]).selects(None, None));
    }

    #[test]
    fn secrets_are_redacted_unless_enabled() {
        assert!(settings(&[("GOPASS_DEBUG_LOG_SECRETS", "true")]).log_secrets);
        assert!(!settings(&[]).log_secrets);
        assert_eq!(redact("hunter2", false), "<redacted>");
        assert_eq!(redact("hunter2", true), "hunter2");
        assert_eq!(secret("hunter2"), redact("hunter2", log_secrets()));
    }
}
