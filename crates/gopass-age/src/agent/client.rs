//! Client side of the age agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gopass_backend::Context;
use gopass_core::config::AgeConfig;
use gopass_core::{appdir, GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::{identity_token, Request, Response};
use crate::identity::Identity;

pub const SOCKET_NAME: &str = "gopass-age-agent.sock";
pub const AGENT_BINARY: &str = "gopass-age-agent";

/// `<user_runtime>/gopass-age-agent.sock`
pub fn default_socket() -> PathBuf {
    appdir::user_runtime().join(SOCKET_NAME)
}

#[derive(Debug, Clone)]
pub struct AgentClient {
    socket: PathBuf,
    binary: PathBuf,
}

impl AgentClient {
    pub fn new(socket: PathBuf) -> Self {
        AgentClient {
            socket,
            binary: PathBuf::from(AGENT_BINARY),
        }
    }

    pub fn from_config(cfg: &AgeConfig) -> Self {
        AgentClient {
            socket: cfg.agent_socket.clone().unwrap_or_else(default_socket),
            binary: cfg
                .agent_binary
                .clone()
                .unwrap_or_else(|| PathBuf::from(AGENT_BINARY)),
        }
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send one request on a fresh connection.
    pub async fn request(&self, ctx: &Context, req: &Request) -> GopassResult<Option<Vec<u8>>> {
        check_socket(&self.socket).await?;
        let line = req.encode();
        let reply = ctx
            .run("agent request", async {
                let mut stream = UnixStream::connect(&self.socket).await?;
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
                stream.flush().await?;

                let mut reader = BufReader::new(stream);
                let mut reply = String::new();
                if reader.read_line(&mut reply).await? == 0 {
                    return Err(GopassError::Agent("agent closed the connection".into()));
                }
                Ok(reply)
            })
            .await?;

        match Response::parse(&reply)? {
            Response::Ok(payload) => Ok(payload),
            Response::Err(msg) => Err(GopassError::Agent(msg)),
        }
    }

    pub async fn ping(&self, ctx: &Context) -> GopassResult<()> {
        self.request(ctx, &Request::Ping).await.map(drop)
    }

    /// Hand identities to the agent, replacing what it held.
    pub async fn identities(&self, ctx: &Context, ids: &[Identity]) -> GopassResult<()> {
        let tokens: Vec<String> = ids
            .iter()
            .map(|id| identity_token(id).expose_secret().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(GopassError::crypto("no identities"));
        }
        self.request(ctx, &Request::Identities(tokens)).await.map(drop)
    }

    pub async fn decrypt(&self, ctx: &Context, ciphertext: &[u8]) -> GopassResult<Vec<u8>> {
        self.request(ctx, &Request::Decrypt(ciphertext.to_vec()))
            .await?
            .ok_or_else(|| GopassError::Agent("agent returned no plaintext".into()))
    }

    /// The cached passphrase for `key`, if the agent has one.
    pub async fn passphrase(&self, ctx: &Context, key: &str) -> GopassResult<Option<SecretString>> {
        let req = Request::Passphrase {
            key: key.to_string(),
            value: None,
        };
        match self.request(ctx, &req).await {
            Ok(Some(raw)) => String::from_utf8(raw)
                .map(|s| Some(SecretString::from(s)))
                .map_err(|_| GopassError::Agent("cached passphrase is not UTF-8".into())),
            Ok(None) => Ok(None),
            Err(GopassError::Agent(msg)) if msg.starts_with("no passphrase cached") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn store_passphrase(&self, ctx: &Context, key: &str, pw: &SecretString) -> GopassResult<()> {
        let req = Request::Passphrase {
            key: key.to_string(),
            value: Some(pw.expose_secret().as_bytes().to_vec()),
        };
        self.request(ctx, &req).await.map(drop)
    }

    pub async fn remove(&self, ctx: &Context, key: &str) -> GopassResult<()> {
        self.request(ctx, &Request::Remove(key.to_string())).await.map(drop)
    }

    pub async fn lock(&self, ctx: &Context) -> GopassResult<()> {
        self.request(ctx, &Request::Lock).await.map(drop)
    }

    pub async fn quit(&self, ctx: &Context) -> GopassResult<()> {
        self.request(ctx, &Request::Quit).await.map(drop)
    }

    /// Ping the agent, starting it in its own process group if nobody
    /// answers.
    pub async fn ensure_running(&self, ctx: &Context) -> GopassResult<()> {
        if self.ping(ctx).await.is_ok() {
            return Ok(());
        }
        tracing::debug!(binary = %self.binary.display(), "starting age agent");
        spawn_detached(&self.binary, &self.socket)?;

        for _ in 0..50 {
            if ctx.is_cancelled() {
                return Err(GopassError::Cancelled("waiting for agent".into()));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.ping(ctx).await.is_ok() {
                tracing::info!(socket = %self.socket.display(), "age agent started");
                return Ok(());
            }
        }
        Err(GopassError::Agent(format!(
            "agent did not come up on {}",
            self.socket.display()
        )))
    }
}

fn spawn_detached(binary: &Path, socket: &Path) -> GopassResult<()> {
    let mut cmd = std::process::Command::new(binary);
    cmd.arg("--socket")
        .arg(socket)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
        .map(drop)
        .map_err(|e| GopassError::Agent(format!("spawning {}: {e}", binary.display())))
}

/// Refuse sockets that are not ours or are readable by others.
pub async fn check_socket(path: &Path) -> GopassResult<()> {
    use std::os::unix::fs::MetadataExt;

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| GopassError::Agent(format!("agent socket {}: {e}", path.display())))?;
    let mode = meta.mode() & 0o777;
    if mode != 0o600 {
        return Err(GopassError::Agent(format!(
            "agent socket {} has mode {mode:o}, expected 600",
            path.display()
        )));
    }
    let uid = unsafe { libc::getuid() };
    if meta.uid() != uid {
        return Err(GopassError::Agent(format!(
            "agent socket {} is owned by uid {}, not {uid}",
            path.display(),
            meta.uid()
        )));
    }
    Ok(())
}
