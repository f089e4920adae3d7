use std::sync::Arc;
use std::time::Duration;

use gopass_age::{Age, GithubSshCache, Keyring};
use gopass_backend::rcs::GitMock;
use gopass_backend::storage::OpendalStorage;
use gopass_backend::{BackendUrl, Context, Crypto, Storage};
use gopass_core::cache::OnDiskCache;
use gopass_core::config::{GithubConfig, GopassConfig, StoreConfig};
use gopass_core::GopassError;
use gopass_cryptfs::{hash_name, Cryptfs, MAPPING_FILE};
use gopass_pinentry::Askpass;
use gopass_store::{register_default_backends, Store};

fn age_backend(dir: &std::path::Path) -> Arc<dyn Crypto> {
    let ttl = Duration::from_secs(60);
    let askpass = Arc::new(Askpass::new(ttl, ttl).with_pinentry(None));
    let keyring = Keyring::in_dir(dir, askpass).with_work_factor(Some(10));
    let cache = OnDiskCache::with_dir("github-ssh", dir.join("github"), ttl);
    Arc::new(Age::new(
        keyring,
        GithubSshCache::with_cache(&GithubConfig::default(), cache).unwrap(),
    ))
}

#[tokio::test]
async fn init_then_reopen_by_detection() {
    let dir = tempfile::tempdir().unwrap();
    let regs = register_default_backends(&GopassConfig::default());
    let cfg = StoreConfig::default();
    let ctx = Context::default();

    let url = BackendUrl::parse(&format!("gpgmock-gitmock-cryptfs+file://{}", dir.path().display())).unwrap();
    let store = Store::init(&ctx, &regs, &url, &cfg, &["0xDEADBEEF".into()], "Test", "test@example.org")
        .await
        .unwrap();
    store.set(&ctx, "web/example.com", b"hunter2").await.unwrap();
    assert!(dir.path().join(MAPPING_FILE).is_file());
    assert!(dir.path().join(hash_name("web/example.com.gpg")).is_file());

    let again = Store::init(&ctx, &regs, &url, &cfg, &[], "Test", "test@example.org").await;
    assert!(matches!(again.unwrap_err(), GopassError::AlreadyExists(_)));

    let reopened = Store::open(&ctx, &regs, &BackendUrl::from_path(dir.path()), &cfg)
        .await
        .unwrap();
    assert_eq!(reopened.crypto().name(), "gpgmock");
    assert_eq!(reopened.rcs().name(), "gitmock");
    assert_eq!(reopened.storage().name(), "cryptfs");
    assert!(reopened.url().pinned);
    assert_eq!(reopened.recipients(&ctx).await.unwrap(), vec!["0xDEADBEEF"]);
    assert_eq!(reopened.list(&ctx, "").await.unwrap(), vec!["web/example.com"]);
    assert_eq!(reopened.get(&ctx, "web/example.com").await.unwrap(), b"hunter2");
}

#[tokio::test]
async fn age_entries_behind_hashed_names() {
    let keys = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let crypto = age_backend(keys.path());
    let ctx = Context::default()
        .with_no_network(true)
        .with_static_passphrase("test");

    crypto.create_private_key(&ctx).await.unwrap();
    let me = crypto.list_private_key_ids(&ctx).await.unwrap().remove(0);

    let inner: Arc<dyn Storage> = Arc::new(OpendalStorage::fs(root.path()).unwrap());
    let storage = Arc::new(Cryptfs::init(&ctx, inner.clone(), crypto.clone()).await.unwrap());
    let store = Store::from_parts(
        BackendUrl::from_path(root.path()),
        crypto.clone(),
        Arc::new(GitMock),
        storage,
    );
    store.add_recipient(&ctx, &me).await.unwrap();
    store.set(&ctx, "bank/pin", b"1234").await.unwrap();
    store.set(&ctx, "bank/login", b"hunter2").await.unwrap();

    assert!(!root.path().join("bank").exists());
    assert!(root.path().join(".age-recipients").is_file());
    assert_eq!(store.list(&ctx, "bank").await.unwrap(), vec!["bank/login", "bank/pin"]);

    // a fresh overlay over the same directory sees the same entries
    let storage = Arc::new(Cryptfs::open(&ctx, inner, crypto.clone()).await.unwrap());
    let reopened = Store::from_parts(
        BackendUrl::from_path(root.path()),
        crypto,
        Arc::new(GitMock),
        storage,
    );
    assert_eq!(reopened.get(&ctx, "bank/pin").await.unwrap(), b"1234");
    assert!(reopened.fsck(&ctx).await.unwrap().is_clean());

    reopened.prune(&ctx, "bank").await.unwrap();
    assert!(reopened.list(&ctx, "").await.unwrap().is_empty());
    assert!(reopened.get(&ctx, "bank/pin").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn detection_on_a_plain_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gpg-id"), "0xDEADBEEF\n").unwrap();
    let regs = register_default_backends(&GopassConfig::default());
    let ctx = Context::default();

    let store = Store::open(&ctx, &regs, &BackendUrl::from_path(dir.path()), &StoreConfig::default())
        .await
        .unwrap();
    assert_eq!(store.storage().name(), "fs");
    assert_eq!(store.crypto().name(), "gpgmock");

    store.set(&ctx, "a/b", b"x").await.unwrap();
    assert!(dir.path().join("a").join("b.gpg").is_file());
}

#[tokio::test]
async fn open_without_recipients_is_not_initialized() {
    let dir = tempfile::tempdir().unwrap();
    let regs = register_default_backends(&GopassConfig::default());
    let url = BackendUrl::parse(&format!("gpgmock-gitmock-fs+file://{}", dir.path().display())).unwrap();

    let err = Store::open(&Context::default(), &regs, &url, &StoreConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GopassError::NotInitialized(_)));
}

#[tokio::test]
async fn fresh_cryptfs_store_is_detected_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let regs = register_default_backends(&GopassConfig::default());
    let cfg = StoreConfig::default();
    let ctx = Context::default();

    let url = BackendUrl::parse(&format!("gpgmock-gitmock-cryptfs+file://{}", dir.path().display())).unwrap();
    Store::init(&ctx, &regs, &url, &cfg, &["0xDEADBEEF".into()], "Test", "test@example.org")
        .await
        .unwrap();
    assert!(dir.path().join(MAPPING_FILE).is_file());

    let reopened = Store::open(&ctx, &regs, &BackendUrl::from_path(dir.path()), &cfg)
        .await
        .unwrap();
    assert_eq!(reopened.storage().name(), "cryptfs");

    reopened.set(&ctx, ".hidden", b"hunter2").await.unwrap();
    assert!(!dir.path().join(".hidden.gpg").exists());
    assert!(dir.path().join(hash_name(".hidden.gpg")).is_file());
    assert!(reopened.exists(&ctx, ".hidden").await.unwrap());
    assert_eq!(reopened.list(&ctx, "").await.unwrap(), vec![".hidden"]);
}

#[tokio::test]
async fn removed_recipient_loses_the_name_table() {
    let keys_a = tempfile::tempdir().unwrap();
    let keys_b = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let alice = age_backend(keys_a.path());
    let bob = age_backend(keys_b.path());
    let ctx = Context::default()
        .with_no_network(true)
        .with_static_passphrase("test");

    alice.create_private_key(&ctx).await.unwrap();
    bob.create_private_key(&ctx).await.unwrap();
    let alice_id = alice.list_private_key_ids(&ctx).await.unwrap().remove(0);
    let bob_id = bob.list_private_key_ids(&ctx).await.unwrap().remove(0);

    let inner: Arc<dyn Storage> = Arc::new(OpendalStorage::fs(root.path()).unwrap());
    let storage = Arc::new(Cryptfs::init(&ctx, inner.clone(), alice.clone()).await.unwrap());
    let store = Store::from_parts(BackendUrl::from_path(root.path()), alice, Arc::new(GitMock), storage);
    store.add_recipient(&ctx, &alice_id).await.unwrap();
    store.add_recipient(&ctx, &bob_id).await.unwrap();
    store.set(&ctx, "bank/pin", b"1234").await.unwrap();

    let table = inner.get(&ctx, MAPPING_FILE).await.unwrap();
    assert!(bob.decrypt(&ctx, &table).await.is_ok());

    store.remove_recipient(&ctx, &bob_id).await.unwrap();
    let table = inner.get(&ctx, MAPPING_FILE).await.unwrap();
    assert!(bob.decrypt(&ctx, &table).await.is_err());
    assert_eq!(store.get(&ctx, "bank/pin").await.unwrap(), b"1234");
}
