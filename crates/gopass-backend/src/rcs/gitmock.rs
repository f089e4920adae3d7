use async_trait::async_trait;
use gopass_core::{GopassError, GopassResult};

use super::{Rcs, Revision};
use crate::context::Context;

/// Sync backend that accepts everything and records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitMock;

#[async_trait]
impl Rcs for GitMock {
    async fn add(&self, _ctx: &Context, _paths: &[String]) -> GopassResult<()> {
        Ok(())
    }

    async fn commit(&self, _ctx: &Context, _message: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn push(&self, _ctx: &Context, _remote: &str, _branch: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn pull(&self, _ctx: &Context, _remote: &str, _branch: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn init_config(&self, _ctx: &Context, _name: &str, _email: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn add_remote(&self, _ctx: &Context, _remote: &str, _url: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn remove_remote(&self, _ctx: &Context, _remote: &str) -> GopassResult<()> {
        Ok(())
    }

    async fn revisions(&self, _ctx: &Context, _name: &str) -> GopassResult<Vec<Revision>> {
        Ok(Vec::new())
    }

    async fn get_revision(&self, _ctx: &Context, _name: &str, _hash: &str) -> GopassResult<Vec<u8>> {
        Err(GopassError::not_supported("gitmock", "get_revision"))
    }

    async fn status(&self, _ctx: &Context) -> GopassResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "gitmock"
    }
}
