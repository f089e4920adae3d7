//! Entry name rules: non-empty, `/`-separated, no empty components.

use gopass_core::{GopassError, GopassResult};

pub fn validate_name(name: &str) -> GopassResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.split('/').any(str::is_empty) {
        Some("name has an empty path component")
    } else if name.split('/').any(|c| c == "." || c == "..") {
        Some("name has a relative path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(GopassError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

/// `prefix` with exactly one trailing `/`, or empty for the root.
pub fn dir_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// List filter: `name` starts with `prefix` once trailing slashes are dropped.
pub fn matches_prefix(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_hierarchical_names() {
        assert!(validate_name("websites/example.com/alice").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        for bad in ["", "/abs", "trailing/", "a//b", "a/../b", "."] {
            assert!(validate_name(bad).is_err(), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn prefixes() {
        assert!(matches_prefix("foo/bar", "foo"));
        assert!(matches_prefix("foo/bar", "foo/"));
        assert!(matches_prefix("foobar/x", "foo"));
        assert!(!matches_prefix("qux/quux", "foo"));
        assert!(matches_prefix("anything", ""));
        assert_eq!(dir_prefix("foo//"), "foo/");
        assert_eq!(dir_prefix(""), "");
    }

    proptest! {
        #[test]
        fn joined_components_are_valid(parts in prop::collection::vec("[a-zA-Z0-9@_-][a-zA-Z0-9@._-]{0,6}", 1..5)) {
            prop_assume!(parts.iter().all(|p| p != "." && p != ".."));
            prop_assert!(validate_name(&parts.join("/")).is_ok());
        }
    }
}
