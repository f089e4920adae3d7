//! gopass-age-agent: holds unlocked age identities for gopass clients.
//!
//! Usage:
//!   gopass-age-agent [--config ~/.config/gopass/config.toml] [--socket PATH]
//!
//! The agent exits on SIGINT, SIGTERM or a `quit` request and removes its
//! socket on the way out.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gopass-age-agent", version, about = "gopass age identity agent")]
struct Cli {
    /// Path to the gopass configuration file
    #[arg(long, short = 'c', env = "GOPASS_CONFIG")]
    config: Option<PathBuf>,

    /// Socket to listen on (default: <runtime dir>/gopass-age-agent.sock)
    #[arg(long, short = 's')]
    socket: Option<PathBuf>,

    /// Log level, overriding the config file
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(gopass_core::config::default_config_path);
    let mut config = gopass_core::config::GopassConfig::load(&config_path)
        .await
        .with_context(|| format!("loading config {}", config_path.display()))?;
    if let Some(level) = cli.log {
        config.log.level = level;
    }
    gopass_core::logging::init(&config.log);

    run(cli.socket, &config).await
}

#[cfg(unix)]
async fn run(socket: Option<PathBuf>, config: &gopass_core::config::GopassConfig) -> Result<()> {
    use std::time::Duration;

    use gopass_age::agent::{default_socket, AgentServer};
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::info;

    let socket = socket
        .or_else(|| config.age.agent_socket.clone())
        .unwrap_or_else(default_socket);
    let ttl = Duration::from_secs(config.cache.passphrase_ttl_secs);
    let max_ttl = Duration::from_secs(config.cache.passphrase_max_ttl_secs);

    let server = AgentServer::bind(&socket, ttl, max_ttl)
        .await
        .with_context(|| format!("binding {}", socket.display()))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        socket = %socket.display(),
        pid = std::process::id(),
        "gopass-age-agent listening"
    );

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });

    server.serve().await?;
    info!("gopass-age-agent stopped");
    Ok(())
}

#[cfg(not(unix))]
async fn run(_socket: Option<PathBuf>, _config: &gopass_core::config::GopassConfig) -> Result<()> {
    anyhow::bail!("gopass-age-agent needs Unix domain sockets")
}
