//! Sync backend driving the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gopass_core::{GopassError, GopassResult};
use tokio::process::Command;

use super::{Rcs, Revision};
use crate::context::Context;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

#[derive(Debug, Clone)]
pub struct GitCli {
    path: PathBuf,
}

impl GitCli {
    /// Open an existing repository. `NotInitialized` if `path` has no `.git`.
    pub fn open(path: &Path) -> GopassResult<Self> {
        if !path.join(".git").exists() {
            return Err(GopassError::NotInitialized(path.display().to_string()));
        }
        Ok(GitCli {
            path: path.to_path_buf(),
        })
    }

    /// `git init` at `path`, optionally setting the committer identity.
    pub async fn init(ctx: &Context, path: &Path, user: &str, email: &str) -> GopassResult<Self> {
        tokio::fs::create_dir_all(path).await?;
        let git = GitCli {
            path: path.to_path_buf(),
        };
        git.run(ctx, &["init", "--quiet"]).await?;
        if !user.is_empty() || !email.is_empty() {
            git.init_config(ctx, user, email).await?;
        }
        tracing::info!(path = %path.display(), "initialized git repository");
        Ok(git)
    }

    pub async fn clone(ctx: &Context, repo: &str, path: &Path) -> GopassResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let target = path.to_string_lossy();
        let output = ctx
            .run("git clone", async {
                Command::new("git")
                    .args(["clone", "--quiet", repo, target.as_ref()])
                    .env("GIT_TERMINAL_PROMPT", "0")
                    .kill_on_drop(true)
                    .output()
                    .await
                    .map_err(GopassError::from)
            })
            .await?;
        check("clone", output)?;
        GitCli::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn output(&self, ctx: &Context, args: &[&str]) -> GopassResult<Output> {
        tracing::debug!(path = %self.path.display(), ?args, "git");
        ctx.run("git", async {
            Command::new("git")
                .args(args)
                .current_dir(&self.path)
                .env("GIT_TERMINAL_PROMPT", "0")
                .kill_on_drop(true)
                .output()
                .await
                .map_err(GopassError::from)
        })
        .await
    }

    async fn run(&self, ctx: &Context, args: &[&str]) -> GopassResult<Vec<u8>> {
        let output = self.output(ctx, args).await?;
        check(args.first().copied().unwrap_or("git"), output)
    }
}

fn check(what: &str, output: Output) -> GopassResult<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(GopassError::Sync(format!("git {what} failed: {}", stderr.trim())))
}

fn parse_log(raw: &str) -> GopassResult<Vec<Revision>> {
    raw.split(RECORD_SEP)
        .map(|r| r.trim_matches(|c| c == '\n' || c == '\r' || c == ' '))
        .filter(|r| !r.is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.splitn(5, FIELD_SEP).collect();
            let [hash, author, date, subject, body] = fields.as_slice() else {
                return Err(GopassError::Sync(format!("malformed git log record: {record:?}")));
            };
            let date = DateTime::parse_from_rfc3339(date)
                .map_err(|e| GopassError::Sync(format!("bad commit date {date:?}: {e}")))?
                .with_timezone(&Utc);
            Ok(Revision {
                hash: hash.to_string(),
                date,
                subject: subject.to_string(),
                body: body.trim().to_string(),
                author_name: author.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Rcs for GitCli {
    async fn add(&self, ctx: &Context, paths: &[String]) -> GopassResult<()> {
        let mut args = vec!["add", "--all", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run(ctx, &args).await?;
        Ok(())
    }

    async fn commit(&self, ctx: &Context, message: &str) -> GopassResult<()> {
        let staged = self.output(ctx, &["diff", "--cached", "--quiet"]).await?;
        if staged.status.success() {
            return Err(GopassError::NothingToCommit);
        }
        self.run(ctx, &["commit", "--quiet", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, ctx: &Context, remote: &str, branch: &str) -> GopassResult<()> {
        self.run(ctx, &["push", remote, branch]).await?;
        Ok(())
    }

    async fn pull(&self, ctx: &Context, remote: &str, branch: &str) -> GopassResult<()> {
        self.run(ctx, &["pull", remote, branch]).await?;
        Ok(())
    }

    async fn init_config(&self, ctx: &Context, name: &str, email: &str) -> GopassResult<()> {
        if !name.is_empty() {
            self.run(ctx, &["config", "--local", "user.name", name]).await?;
        }
        if !email.is_empty() {
            self.run(ctx, &["config", "--local", "user.email", email]).await?;
        }
        self.run(ctx, &["config", "--local", "commit.gpgsign", "false"])
            .await?;
        Ok(())
    }

    async fn add_remote(&self, ctx: &Context, remote: &str, url: &str) -> GopassResult<()> {
        self.run(ctx, &["remote", "add", remote, url]).await?;
        Ok(())
    }

    async fn remove_remote(&self, ctx: &Context, remote: &str) -> GopassResult<()> {
        self.run(ctx, &["remote", "remove", remote]).await?;
        Ok(())
    }

    async fn revisions(&self, ctx: &Context, name: &str) -> GopassResult<Vec<Revision>> {
        let out = self
            .run(
                ctx,
                &[
                    "log",
                    "--format=%H%x1f%an%x1f%aI%x1f%s%x1f%b%x1e",
                    "--",
                    name,
                ],
            )
            .await?;
        parse_log(&String::from_utf8_lossy(&out))
    }

    async fn get_revision(&self, ctx: &Context, name: &str, hash: &str) -> GopassResult<Vec<u8>> {
        let spec = format!("{hash}:{name}");
        self.run(ctx, &["show", &spec]).await
    }

    async fn status(&self, ctx: &Context) -> GopassResult<Vec<u8>> {
        self.run(ctx, &["status", "--porcelain"]).await
    }

    fn name(&self) -> &'static str {
        "gitcli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_records() {
        let raw = "abc123\u{1f}Alice\u{1f}2024-03-01T10:00:00+01:00\u{1f}Add foo\u{1f}details\n\u{1e}\n\
                   def456\u{1f}Bob\u{1f}2024-02-01T09:00:00Z\u{1f}Init\u{1f}\u{1e}\n";
        let revs = parse_log(raw).unwrap();
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].hash, "abc123");
        assert_eq!(revs[0].author_name, "Alice");
        assert_eq!(revs[0].subject, "Add foo");
        assert_eq!(revs[0].body, "details");
        assert_eq!(revs[0].date.to_rfc3339(), "2024-03-01T09:00:00+00:00");
        assert_eq!(revs[1].body, "");
    }

    #[test]
    fn malformed_record() {
        assert!(parse_log("abc\u{1f}only-two\u{1e}").is_err());
    }

    #[test]
    fn open_requires_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitCli::open(dir.path()),
            Err(GopassError::NotInitialized(_))
        ));
    }
}
