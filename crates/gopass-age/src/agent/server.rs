//! The age agent daemon: holds decrypted identities and cached passphrases
//! behind a user-private Unix socket.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gopass_core::cache::InMemTtl;
use gopass_core::{GopassError, GopassResult};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::protocol::{parse_identity_tokens, Request, Response};
use crate::callbacks::PromptCallbacks;
use crate::identity::{Identity, IdentitySet};

#[derive(Default)]
struct Identities {
    list: Vec<Identity>,
}

struct State {
    identities: Mutex<Identities>,
    passphrases: InMemTtl<String, Arc<SecretString>>,
}

impl State {
    fn identities(&self) -> Vec<Identity> {
        self.identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .list
            .clone()
    }

    fn set_identities(&self, list: Vec<Identity>) {
        self.identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .list = list;
    }

    async fn dispatch(&self, req: Request) -> Response {
        match req {
            Request::Ping => Response::Ok(None),
            Request::Identities(tokens) => match parse_identity_tokens(&tokens) {
                Ok(list) => {
                    debug!(count = list.len(), "agent received identities");
                    self.set_identities(list);
                    Response::Ok(None)
                }
                Err(e) => Response::Err(e.to_string()),
            },
            Request::Decrypt(ciphertext) => self.decrypt(ciphertext).await,
            Request::Passphrase { key, value: Some(v) } => match String::from_utf8(v) {
                Ok(pw) => {
                    debug!(
                        key = %key,
                        passphrase = gopass_core::logging::secret(&pw),
                        "agent cached passphrase"
                    );
                    self.passphrases.set(key, Arc::new(SecretString::from(pw)));
                    Response::Ok(None)
                }
                Err(_) => Response::Err("passphrase is not UTF-8".into()),
            },
            Request::Passphrase { key, value: None } => match self.passphrases.get(&key) {
                Some(pw) => Response::Ok(Some(pw.expose_secret().as_bytes().to_vec())),
                None => Response::Err(format!("no passphrase cached for {key}")),
            },
            Request::Remove(key) => {
                self.passphrases.remove(&key);
                Response::Ok(None)
            }
            Request::Lock => {
                self.passphrases.purge();
                self.set_identities(Vec::new());
                info!("agent locked");
                Response::Ok(None)
            }
            Request::Quit => Response::Ok(None),
        }
    }

    async fn decrypt(&self, ciphertext: Vec<u8>) -> Response {
        let native = self.identities();
        if native.is_empty() {
            return Response::Err("failed to decrypt: no identities".into());
        }
        let set = IdentitySet {
            native,
            ssh: Vec::new(),
            callbacks: PromptCallbacks::noop(),
        };
        match tokio::task::spawn_blocking(move || set.decrypt(&ciphertext)).await {
            Ok(Ok(plaintext)) => Response::Ok(Some(plaintext)),
            Ok(Err(GopassError::Crypto { message, .. })) => Response::Err(message),
            Ok(Err(e)) => Response::Err(format!("failed to decrypt: {e}")),
            Err(e) => Response::Err(format!("failed to decrypt: {e}")),
        }
    }
}

pub struct AgentServer {
    socket: PathBuf,
    listener: UnixListener,
    state: Arc<State>,
    shutdown: CancellationToken,
}

impl AgentServer {
    /// Bind the agent socket. Fails if another agent answers on it; a stale
    /// socket file is replaced.
    pub async fn bind(socket: &Path, ttl: Duration, max_ttl: Duration) -> GopassResult<Self> {
        if tokio::fs::symlink_metadata(socket).await.is_ok() {
            if UnixStream::connect(socket).await.is_ok() {
                return Err(GopassError::Agent(format!(
                    "an agent is already listening on {}",
                    socket.display()
                )));
            }
            debug!(socket = %socket.display(), "removing stale agent socket");
            tokio::fs::remove_file(socket).await?;
        }
        if let Some(parent) = socket.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let listener = bind_private(socket)
            .await
            .map_err(|e| GopassError::Agent(format!("binding {}: {e}", socket.display())))?;

        info!(socket = %socket.display(), "age agent listening");
        Ok(AgentServer {
            socket: socket.to_path_buf(),
            listener,
            state: Arc::new(State {
                identities: Mutex::new(Identities::default()),
                passphrases: InMemTtl::new(ttl, max_ttl),
            }),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Cancelling this token stops the accept loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until shutdown, then remove the socket file.
    pub async fn serve(self) -> GopassResult<()> {
        let AgentServer {
            socket,
            listener,
            state,
            shutdown,
        } = self;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let state = state.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle(stream, state, shutdown).await {
                                debug!(error = %e, "agent connection ended");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "agent accept failed"),
                },
            }
        }

        drop(listener);
        if let Err(e) = tokio::fs::remove_file(&socket).await {
            debug!(socket = %socket.display(), error = %e, "failed to unlink agent socket");
        }
        info!("age agent stopped");
        Ok(())
    }
}

async fn handle(stream: UnixStream, state: Arc<State>, shutdown: CancellationToken) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let mut line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(l) => l,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let (mut response, quit) = match Request::parse(&line) {
            Ok(Request::Quit) => (Response::Ok(None), true),
            Ok(req) => (state.dispatch(req).await, false),
            Err(msg) => (Response::Err(msg), false),
        };
        line.zeroize();
        let mut out = response.encode();
        out.push('\n');
        let written = write.write_all(out.as_bytes()).await;
        // plaintexts and passphrases must not outlive the reply
        out.zeroize();
        if let Response::Ok(Some(payload)) = &mut response {
            payload.zeroize();
        }
        written?;
        write.flush().await?;

        if quit {
            info!("agent quit requested");
            shutdown.cancel();
            break;
        }
    }
    Ok(())
}

/// Bind inside a fresh 0700 directory next to `socket`, then move the
/// socket into place. It is never reachable with wider permissions.
async fn bind_private(socket: &Path) -> std::io::Result<UnixListener> {
    let parent = socket
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staging = parent.join(format!(".gopass-age-agent.{}", std::process::id()));
    match tokio::fs::remove_dir_all(&staging).await {
        Ok(()) => debug!(dir = %staging.display(), "removed leftover staging directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    create_private_dir(&staging).await?;

    let staged = staging.join("s");
    let bound = async {
        let listener = UnixListener::bind(&staged)?;
        set_private(&staged).await?;
        tokio::fs::rename(&staged, socket).await?;
        Ok::<_, std::io::Error>(listener)
    }
    .await;
    if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
        warn!(dir = %staging.display(), error = %e, "failed to remove staging directory");
    }
    bound
}

#[cfg(unix)]
async fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.mode(0o700);
    builder.create(path).await
}

#[cfg(not(unix))]
async fn create_private_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir(path).await
}

#[cfg(unix)]
async fn set_private(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn set_private(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        State {
            identities: Mutex::new(Identities::default()),
            passphrases: InMemTtl::new(Duration::from_secs(60), Duration::from_secs(60)),
        }
    }

    #[tokio::test]
    async fn decrypt_without_identities() {
        let s = state();
        assert_eq!(
            s.dispatch(Request::Decrypt(b"x".to_vec())).await,
            Response::Err("failed to decrypt: no identities".into())
        );
    }

    #[tokio::test]
    async fn passphrase_cache_and_lock() {
        let s = state();
        let set = Request::Passphrase {
            key: "k".into(),
            value: Some(b"pw".to_vec()),
        };
        assert_eq!(s.dispatch(set).await, Response::Ok(None));
        let get = Request::Passphrase {
            key: "k".into(),
            value: None,
        };
        assert_eq!(s.dispatch(get.clone()).await, Response::Ok(Some(b"pw".to_vec())));

        assert_eq!(s.dispatch(Request::Remove("k".into())).await, Response::Ok(None));
        assert!(matches!(s.dispatch(get.clone()).await, Response::Err(_)));

        s.passphrases.set("k".into(), Arc::new(SecretString::from("pw".to_string())));
        s.set_identities(vec![Identity::X25519(age::x25519::Identity::generate())]);
        assert_eq!(s.dispatch(Request::Lock).await, Response::Ok(None));
        assert!(s.identities().is_empty());
        assert!(matches!(s.dispatch(get).await, Response::Err(_)));
    }

    #[tokio::test]
    async fn bad_identities_keep_previous() {
        let s = state();
        s.set_identities(vec![Identity::X25519(age::x25519::Identity::generate())]);
        let resp = s.dispatch(Request::Identities(vec!["bogus".into()])).await;
        assert!(matches!(resp, Response::Err(_)));
        assert_eq!(s.identities().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn socket_is_private_and_exclusive() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("agent.sock");
        let server = AgentServer::bind(&sock, Duration::from_secs(60), Duration::from_secs(60))
            .await
            .unwrap();
        let mode = std::fs::metadata(&sock).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        // bound in a staging directory that is gone once the socket is in place
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("agent.sock")]);
        UnixStream::connect(&sock).await.unwrap();

        let err = AgentServer::bind(&sock, Duration::from_secs(60), Duration::from_secs(60))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GopassError::Agent(_)));

        let token = server.shutdown_token();
        let task = tokio::spawn(server.serve());
        token.cancel();
        task.await.unwrap().unwrap();
        assert!(!sock.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("agent.sock");
        // bound then dropped: file stays, nobody listens
        drop(std::os::unix::net::UnixListener::bind(&sock).unwrap());
        assert!(sock.exists());
        let server = AgentServer::bind(&sock, Duration::from_secs(60), Duration::from_secs(60)).await;
        assert!(server.is_ok());
    }
}
