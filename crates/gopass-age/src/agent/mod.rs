//! The age agent: a per-user daemon caching decrypted identities.

#[cfg(unix)]
mod client;
pub mod protocol;
#[cfg(unix)]
mod server;

#[cfg(unix)]
pub use client::{check_socket, default_socket, AgentClient, AGENT_BINARY, SOCKET_NAME};
#[cfg(unix)]
pub use server::AgentServer;
