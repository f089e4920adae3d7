//! Line protocol between the age agent and its clients.
//!
//! One request per line, one response line per request:
//!
//! ```text
//! ping
//! identities <identity> [<identity> ...]
//! decrypt <base64>
//! passphrase <key> [<base64>]
//! remove <key>
//! lock
//! quit
//! ```
//!
//! answered by `OK`, `OK <base64>` or `ERR <message>`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gopass_core::{GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};

use crate::identity::Identity;

/// Identity token carrying a passphrase for scrypt-encrypted files.
pub const SCRYPT_PREFIX: &str = "scrypt:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    /// Raw identity tokens; parsed by the agent.
    Identities(Vec<String>),
    Decrypt(Vec<u8>),
    /// Fetch (`value` = None) or store a cached passphrase.
    Passphrase { key: String, value: Option<Vec<u8>> },
    Remove(String),
    Lock,
    Quit,
}

impl Request {
    /// Parse one request line. The error text is sent back verbatim.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (cmd, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        match cmd {
            "ping" => Ok(Request::Ping),
            "lock" => Ok(Request::Lock),
            "quit" => Ok(Request::Quit),
            "identities" => {
                let ids: Vec<String> = rest.split_whitespace().map(String::from).collect();
                if ids.is_empty() {
                    return Err("identities: missing argument".into());
                }
                Ok(Request::Identities(ids))
            }
            "decrypt" => STANDARD
                .decode(rest)
                .map(Request::Decrypt)
                .map_err(|e| format!("decrypt: invalid base64: {e}")),
            "remove" if !rest.is_empty() => Ok(Request::Remove(rest.to_string())),
            "remove" => Err("remove: missing key".into()),
            "passphrase" => {
                let mut parts = rest.split_whitespace();
                let key = parts
                    .next()
                    .ok_or_else(|| "passphrase: missing key".to_string())?
                    .to_string();
                let value = match parts.next() {
                    Some(b64) => Some(
                        STANDARD
                            .decode(b64)
                            .map_err(|e| format!("passphrase: invalid base64: {e}"))?,
                    ),
                    None => None,
                };
                Ok(Request::Passphrase { key, value })
            }
            _ => Err("unknown command".into()),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Request::Ping => "ping".into(),
            Request::Lock => "lock".into(),
            Request::Quit => "quit".into(),
            Request::Identities(ids) => format!("identities {}", ids.join(" ")),
            Request::Decrypt(ct) => format!("decrypt {}", STANDARD.encode(ct)),
            Request::Remove(key) => format!("remove {key}"),
            Request::Passphrase { key, value: None } => format!("passphrase {key}"),
            Request::Passphrase {
                key,
                value: Some(v),
            } => format!("passphrase {key} {}", STANDARD.encode(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(Option<Vec<u8>>),
    Err(String),
}

impl Response {
    pub fn encode(&self) -> String {
        match self {
            Response::Ok(None) => "OK".into(),
            Response::Ok(Some(payload)) => format!("OK {}", STANDARD.encode(payload)),
            Response::Err(msg) => format!("ERR {}", msg.replace(['\r', '\n'], " ")),
        }
    }

    pub fn parse(line: &str) -> GopassResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "OK" {
            return Ok(Response::Ok(None));
        }
        if let Some(b64) = line.strip_prefix("OK ") {
            return STANDARD
                .decode(b64.trim())
                .map(|p| Response::Ok(Some(p)))
                .map_err(|e| GopassError::Agent(format!("invalid agent payload: {e}")));
        }
        if let Some(msg) = line.strip_prefix("ERR") {
            return Ok(Response::Err(msg.trim().to_string()));
        }
        Err(GopassError::Agent(format!("unexpected agent reply {line:?}")))
    }
}

/// Wire token of an identity.
pub fn identity_token(id: &Identity) -> SecretString {
    match id {
        Identity::Scrypt(pw) => SecretString::from(format!(
            "{SCRYPT_PREFIX}{}",
            STANDARD.encode(pw.expose_secret().as_bytes())
        )),
        other => other.encode().unwrap_or_else(|| SecretString::from(String::new())),
    }
}

/// Parse the tokens of an `identities` request.
pub fn parse_identity_tokens(tokens: &[String]) -> GopassResult<Vec<Identity>> {
    tokens
        .iter()
        .map(|t| match t.strip_prefix(SCRYPT_PREFIX) {
            Some(b64) => {
                let raw = STANDARD
                    .decode(b64)
                    .map_err(|e| GopassError::crypto(format!("invalid scrypt identity: {e}")))?;
                let pw = String::from_utf8(raw)
                    .map_err(|_| GopassError::crypto("scrypt passphrase is not UTF-8"))?;
                Ok(Identity::scrypt(SecretString::from(pw)))
            }
            None => Identity::parse(t),
        })
        .collect()
}
