//! File creation mask from `GOPASS_UMASK` / `PASSWORD_STORE_UMASK`.

/// Default mask: files are readable by the owner only.
pub const DEFAULT_UMASK: u32 = 0o077;

/// The effective umask for files written by gopass.
pub fn umask() -> u32 {
    umask_from(&|key| std::env::var(key).ok())
}

fn umask_from(lookup: &dyn Fn(&str) -> Option<String>) -> u32 {
    for key in ["GOPASS_UMASK", "PASSWORD_STORE_UMASK"] {
        if let Some(raw) = lookup(key) {
            match u32::from_str_radix(raw.trim(), 8) {
                Ok(mask) if mask <= 0o777 => return mask,
                _ => tracing::warn!(var = key, value = %raw, "ignoring invalid umask"),
            }
        }
    }
    DEFAULT_UMASK
}

/// Apply the umask to a requested mode.
pub fn mode(requested: u32) -> u32 {
    requested & !umask()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octal() {
        let lookup = |k: &str| (k == "GOPASS_UMASK").then(|| "022".to_string());
        assert_eq!(umask_from(&lookup), 0o022);
    }

    #[test]
    fn gopass_umask_takes_precedence() {
        let lookup = |k: &str| match k {
            "GOPASS_UMASK" => Some("027".to_string()),
            "PASSWORD_STORE_UMASK" => Some("000".to_string()),
            _ => None,
        };
        assert_eq!(umask_from(&lookup), 0o027);
    }

    #[test]
    fn invalid_falls_back() {
        let lookup = |k: &str| (k == "PASSWORD_STORE_UMASK").then(|| "9x".to_string());
        assert_eq!(umask_from(&lookup), DEFAULT_UMASK);
        assert_eq!(umask_from(&|_| None), DEFAULT_UMASK);
    }
}
