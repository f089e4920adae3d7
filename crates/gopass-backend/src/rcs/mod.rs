//! Sync contract: revision control over a store directory.

mod gitcli;
mod gitmock;

pub use gitcli::GitCli;
pub use gitmock::GitMock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gopass_core::GopassResult;

use crate::context::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub hash: String,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub author_name: String,
}

#[async_trait]
pub trait Rcs: Send + Sync {
    async fn add(&self, ctx: &Context, paths: &[String]) -> GopassResult<()>;

    /// Fails with `NothingToCommit` when nothing is staged.
    async fn commit(&self, ctx: &Context, message: &str) -> GopassResult<()>;

    async fn push(&self, ctx: &Context, remote: &str, branch: &str) -> GopassResult<()>;

    async fn pull(&self, ctx: &Context, remote: &str, branch: &str) -> GopassResult<()>;

    async fn init_config(&self, ctx: &Context, name: &str, email: &str) -> GopassResult<()>;

    async fn add_remote(&self, ctx: &Context, remote: &str, url: &str) -> GopassResult<()>;

    async fn remove_remote(&self, ctx: &Context, remote: &str) -> GopassResult<()>;

    /// Newest first.
    async fn revisions(&self, ctx: &Context, name: &str) -> GopassResult<Vec<Revision>>;

    async fn get_revision(&self, ctx: &Context, name: &str, hash: &str) -> GopassResult<Vec<u8>>;

    async fn status(&self, ctx: &Context) -> GopassResult<Vec<u8>>;

    fn name(&self) -> &'static str;
}
