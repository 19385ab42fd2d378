//! Integration tests for mount selection, key filters and single lookups

mod common;

use chrono::{TimeZone, Utc};
use common::{leaf_metadata, ManualClock, MockAuthenticator, MockConnector, MockStore};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use vault_inventory::auth::{CredentialManager, CredentialWindows};
use vault_inventory::config::CrawlSettings;
use vault_inventory::secrets::MountInfo;
use vault_inventory::{CrawlStream, Enumerator, InventoryError, SecretQuery};

struct Fixture {
    enumerator: Enumerator,
    connector: Arc<MockConnector>,
    authenticator: Arc<MockAuthenticator>,
}

fn fixture(store: MockStore) -> Fixture {
    let store = Arc::new(store);
    let authenticator = Arc::new(MockAuthenticator::new(Duration::from_secs(3600), true));
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()));

    let credentials = Arc::new(CredentialManager::new(
        authenticator.clone(),
        store.clone(),
        CredentialWindows::default(),
        clock,
    ));
    let connector = Arc::new(MockConnector::new(store));
    let enumerator = Enumerator::new(credentials, connector.clone(), CrawlSettings::default());

    Fixture { enumerator, connector, authenticator }
}

fn inventory() -> MockStore {
    MockStore::new()
        .kv2_mount("secret/")
        .kv2_mount("team/")
        .mount("legacy/", MountInfo::new("kv").with_option("version", "1"))
        .mount("pki/", MountInfo::new("pki"))
        .secret("secret/", "app/db/password", leaf_metadata(3, false, None))
        .secret("secret/", "app/db/username", leaf_metadata(1, false, None))
        .secret("secret/", "app/api-key", leaf_metadata(2, false, None))
        .secret("secret/", "apple", leaf_metadata(1, false, None))
        .secret("secret/", "ops/ssh/deploy", leaf_metadata(1, false, None))
        .secret("team/", "app/token", leaf_metadata(4, false, None))
        .secret("legacy/", "old", leaf_metadata(1, false, None))
        .secret("pki/", "cert", leaf_metadata(1, false, None))
}

async fn collect(stream: CrawlStream) -> BTreeSet<String> {
    stream
        .map(|item| {
            let metadata = item.expect("unexpected crawl error");
            format!("{}{}", metadata.mount(), metadata.key())
        })
        .collect()
        .await
}

fn set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_all_kv2_mounts_are_crawled() {
    let f = fixture(inventory());

    let stream = f.enumerator.list_secrets(&SecretQuery::all()).await.unwrap();

    assert_eq!(
        collect(stream).await,
        set(&[
            "secret/app/api-key",
            "secret/app/db/password",
            "secret/app/db/username",
            "secret/apple",
            "secret/ops/ssh/deploy",
            "team/app/token",
        ])
    );
}

#[tokio::test]
async fn test_mount_filter_accepts_missing_trailing_slash() {
    let f = fixture(inventory());

    let stream = f.enumerator.list_secrets(&SecretQuery::all().mount("team")).await.unwrap();
    assert_eq!(collect(stream).await, set(&["team/app/token"]));
}

#[tokio::test]
async fn test_kv1_and_other_engines_are_skipped() {
    let f = fixture(inventory());

    let stream = f.enumerator.list_secrets(&SecretQuery::all().mount("legacy/")).await.unwrap();
    assert!(collect(stream).await.is_empty());

    let stream = f.enumerator.list_secrets(&SecretQuery::all().mount("pki/")).await.unwrap();
    assert!(collect(stream).await.is_empty());
}

#[tokio::test]
async fn test_unknown_mount_yields_nothing() {
    let f = fixture(inventory());

    let stream = f.enumerator.list_secrets(&SecretQuery::all().mount("missing")).await.unwrap();
    assert!(collect(stream).await.is_empty());
}

#[tokio::test]
async fn test_exact_key_filter() {
    let f = fixture(inventory());

    let query = SecretQuery::all().exact("app/db/password");
    let stream = f.enumerator.list_secrets(&query).await.unwrap();

    // secret/ has the key, team/ does not and is silently skipped
    assert_eq!(collect(stream).await, set(&["secret/app/db/password"]));
}

#[tokio::test]
async fn test_prefix_filter_on_folder_boundary() {
    let f = fixture(inventory());

    let query = SecretQuery::all().mount("secret").prefix("app/db/");
    let stream = f.enumerator.list_secrets(&query).await.unwrap();

    assert_eq!(collect(stream).await, set(&["secret/app/db/password", "secret/app/db/username"]));
}

#[tokio::test]
async fn test_prefix_filter_inside_a_name() {
    let f = fixture(inventory());

    let query = SecretQuery::all().prefix("app");
    let stream = f.enumerator.list_secrets(&query).await.unwrap();

    assert_eq!(
        collect(stream).await,
        set(&[
            "secret/app/api-key",
            "secret/app/db/password",
            "secret/app/db/username",
            "secret/apple",
            "team/app/token",
        ])
    );
}

#[tokio::test]
async fn test_query_concurrency_override() {
    let f = fixture(inventory());

    let query = SecretQuery::all().mount("secret/").concurrency(1);
    let stream = f.enumerator.list_secrets(&query).await.unwrap();
    assert_eq!(collect(stream).await.len(), 5);
}

#[tokio::test]
async fn test_get_secret() {
    let f = fixture(inventory());

    let found = f.enumerator.get_secret("secret", "app/db/password").await.unwrap().unwrap();
    assert_eq!(found.mount(), "secret/");
    assert_eq!(found.key(), "app/db/password");
    assert_eq!(found.version, 3);

    let missing = f.enumerator.get_secret("secret/", "app/db/nope").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_mount_listing_failure() {
    let f = fixture(inventory().failing_mounts());

    let err = f.enumerator.list_secrets(&SecretQuery::all()).await.err().unwrap();
    match err {
        InventoryError::CrawlRoot { mount, message } => {
            assert_eq!(mount, "sys/mounts");
            assert!(message.contains("permission denied"));
        }
        other => panic!("expected crawl root error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_failure_is_returned_before_crawling() {
    let f = fixture(inventory());
    f.authenticator.fail.store(true, Ordering::SeqCst);

    let err = f.enumerator.list_secrets(&SecretQuery::all()).await.err().unwrap();
    assert!(matches!(err, InventoryError::Auth { .. }));
    assert!(f.connector.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connector_receives_fresh_token() {
    let f = fixture(inventory());

    f.enumerator.get_secret("secret/", "apple").await.unwrap();
    f.enumerator.get_secret("team/", "app/token").await.unwrap();

    let tokens = f.connector.tokens.lock().unwrap().clone();
    assert_eq!(tokens, vec!["s.login-1".to_string(), "s.login-1".to_string()]);
    assert_eq!(f.authenticator.calls(), 1);
}

#[tokio::test]
async fn test_folder_shaped_exact_key_matches_nothing() {
    let f = fixture(inventory());

    for key in ["app/", "app/db/", "", "/"] {
        let stream = f.enumerator.list_secrets(&SecretQuery::all().exact(key)).await.unwrap();
        assert!(collect(stream).await.is_empty(), "exact key {:?}", key);
    }

    assert!(f.enumerator.get_secret("secret/", "app/db/").await.unwrap().is_none());
    assert!(f.enumerator.get_secret("secret/", "").await.unwrap().is_none());
}
