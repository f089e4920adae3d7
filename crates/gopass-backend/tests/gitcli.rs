//! Exercises the git CLI backend against a real repository.
//! Skipped when no `git` binary is on the PATH.

use gopass_backend::rcs::GitCli;
use gopass_backend::{Context, Rcs};
use gopass_core::GopassError;

fn have_git() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn commit_history_roundtrip() {
    if !have_git() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::default();
    let git = GitCli::init(&ctx, dir.path(), "Test User", "test@example.org")
        .await
        .unwrap();

    std::fs::write(dir.path().join("foo.gpg"), "first").unwrap();
    git.add(&ctx, &["foo.gpg".into()]).await.unwrap();
    git.commit(&ctx, "Add foo").await.unwrap();

    std::fs::write(dir.path().join("foo.gpg"), "second").unwrap();
    git.add(&ctx, &["foo.gpg".into()]).await.unwrap();
    git.commit(&ctx, "Update foo").await.unwrap();

    let revs = git.revisions(&ctx, "foo.gpg").await.unwrap();
    assert_eq!(revs.len(), 2);
    assert_eq!(revs[0].subject, "Update foo");
    assert_eq!(revs[1].subject, "Add foo");
    assert_eq!(revs[0].author_name, "Test User");

    let old = git.get_revision(&ctx, "foo.gpg", &revs[1].hash).await.unwrap();
    assert_eq!(old, b"first");

    assert!(matches!(
        git.commit(&ctx, "nothing").await,
        Err(GopassError::NothingToCommit)
    ));
    assert!(git.status(&ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn deletions_are_staged() {
    if !have_git() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::default();
    let git = GitCli::init(&ctx, dir.path(), "Test User", "test@example.org")
        .await
        .unwrap();
    std::fs::write(dir.path().join("a"), "x").unwrap();
    git.add(&ctx, &["a".into()]).await.unwrap();
    git.commit(&ctx, "add a").await.unwrap();

    std::fs::remove_file(dir.path().join("a")).unwrap();
    git.add(&ctx, &["a".into()]).await.unwrap();
    git.commit(&ctx, "remove a").await.unwrap();
    assert_eq!(git.revisions(&ctx, "a").await.unwrap().len(), 2);
}

#[tokio::test]
async fn remotes() {
    if !have_git() {
        eprintln!("git not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::default();
    let git = GitCli::init(&ctx, dir.path(), "", "").await.unwrap();
    git.add_remote(&ctx, "origin", "https://example.invalid/store.git")
        .await
        .unwrap();
    assert!(git.add_remote(&ctx, "origin", "x").await.is_err());
    git.remove_remote(&ctx, "origin").await.unwrap();
}
