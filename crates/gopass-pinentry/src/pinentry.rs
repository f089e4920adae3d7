//! Minimal Assuan client for the `pinentry` family of programs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use gopass_core::{GopassError, GopassResult};
use secrecy::SecretString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;

const CANDIDATES: &[&str] = &["pinentry-mac", "pinentry-gnome3", "pinentry-curses", "pinentry"];

/// Assuan error code pinentry uses for a user cancel.
const ERR_CANCELED: &str = "83886179";

#[derive(Debug, Clone)]
pub struct Pinentry {
    program: PathBuf,
    args: Vec<OsString>,
}

/// One pinentry dialog.
#[derive(Debug, Clone)]
pub struct Request {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub repeat: Option<String>,
}

impl Request {
    pub fn new(description: &str, repeat: bool) -> Self {
        Request {
            title: "gopass".into(),
            description: description.into(),
            prompt: "Passphrase:".into(),
            repeat: repeat.then(|| "Confirm".to_string()),
        }
    }

    fn commands(&self) -> Vec<String> {
        let mut cmds = vec![
            format!("SETTITLE {}", escape(&self.title)),
            format!("SETDESC {}", escape(&self.description)),
            format!("SETPROMPT {}", escape(&self.prompt)),
        ];
        if let Some(repeat) = &self.repeat {
            cmds.push(format!("SETREPEAT {}", escape(repeat)));
        }
        cmds.push("GETPIN".into());
        cmds
    }
}

impl Pinentry {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Pinentry {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// `GOPASS_PINENTRY`, else the first known pinentry on `PATH`.
    pub fn find() -> Option<Self> {
        if let Some(p) = std::env::var_os("GOPASS_PINENTRY").filter(|p| !p.is_empty()) {
            return Some(Pinentry::new(p));
        }
        let path = std::env::var_os("PATH")?;
        let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
        CANDIDATES.iter().find_map(|name| {
            dirs.iter()
                .map(|d| d.join(name))
                .find(|p| is_executable(p))
                .map(Pinentry::new)
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn get_pin(&self, request: &Request) -> GopassResult<SecretString> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GopassError::Prompt("pinentry stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GopassError::Prompt("pinentry stdout unavailable".into()))?;
        let mut reader = BufReader::new(stdout);

        let result = converse(&mut reader, &mut stdin, &request.commands()).await;
        // best effort; the dialog result is already in hand
        let _ = stdin.write_all(b"BYE\n").await;
        drop(stdin);
        let _ = child.wait().await;

        result?
            .map(SecretString::from)
            .ok_or_else(|| GopassError::Prompt("pinentry returned no passphrase".into()))
    }
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    p.is_file()
}

/// Percent-escape an Assuan argument.
fn escape(s: &str) -> String {
    s.replace('%', "%25").replace('\n', "%0A").replace('\r', "%0D")
}

/// Send `commands` in order, returning the data lines of the last one.
async fn converse<R, W>(reader: &mut R, writer: &mut W, commands: &[String]) -> GopassResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    read_reply(reader).await?;
    let mut data = None;
    for cmd in commands {
        writer.write_all(cmd.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        data = read_reply(reader).await?;
    }
    Ok(data)
}

async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> GopassResult<Option<String>> {
    let mut data: Option<String> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(GopassError::Prompt("pinentry closed the connection".into()));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "OK" || line.starts_with("OK ") {
            return Ok(data);
        }
        if let Some(payload) = line.strip_prefix("D ") {
            let decoded = urlencoding::decode(payload)
                .map_err(|e| GopassError::Prompt(format!("bad pinentry data: {e}")))?;
            data.get_or_insert_with(String::new).push_str(&decoded);
            continue;
        }
        if let Some(err) = line.strip_prefix("ERR ") {
            if err.starts_with(ERR_CANCELED) {
                return Err(GopassError::Cancelled("passphrase entry".into()));
            }
            return Err(GopassError::Prompt(format!("pinentry: {err}")));
        }
        // status (S) and comment (#) lines carry nothing we need
    }
}
