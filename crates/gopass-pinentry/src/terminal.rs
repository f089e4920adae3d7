//! Terminal prompt used when no pinentry program is available.

use gopass_core::{GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};

pub async fn prompt(reason: &str, repeat: bool) -> GopassResult<SecretString> {
    let reason = reason.to_string();
    tokio::task::spawn_blocking(move || read_twice(&reason, repeat))
        .await
        .map_err(|e| GopassError::Prompt(format!("prompt task failed: {e}")))?
}

fn read_twice(reason: &str, repeat: bool) -> GopassResult<SecretString> {
    let first = read_one(&format!("{reason}\nPassphrase: "))?;
    if repeat {
        let second = read_one("Confirm: ")?;
        if first.expose_secret() != second.expose_secret() {
            return Err(GopassError::Prompt("passphrases do not match".into()));
        }
    }
    Ok(first)
}

fn read_one(label: &str) -> GopassResult<SecretString> {
    rpassword::prompt_password(label)
        .map(SecretString::from)
        .map_err(|e| GopassError::Prompt(format!("reading passphrase: {e}")))
}
