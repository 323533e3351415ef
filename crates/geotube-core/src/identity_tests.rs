use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::identity::{
    classify_device, FileTokenStorage, IdentityResolver, MemoryTokenStorage, TokenStorage,
    TokenStorageError,
};
use crate::store::{MemoryStore, StoreOp};

const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
const FIREFOX_ANDROID_TABLET: &str = "Mozilla/5.0 (Android 13; Tablet; rv:120.0) Gecko/120.0 Firefox/120.0";
const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("geotube-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn resolver(storage: Arc<dyn TokenStorage>) -> IdentityResolver {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    IdentityResolver::new(storage, clock, &TrackerConfig::default(), CHROME_WINDOWS)
}

struct BrokenStorage;

impl TokenStorage for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, TokenStorageError> {
        Err(TokenStorageError::Io("storage disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), TokenStorageError> {
        Err(TokenStorageError::Io("storage disabled".to_string()))
    }
}

#[test]
fn classifies_desktop_chrome_on_windows() {
    let device = classify_device(CHROME_WINDOWS);

    assert_eq!(device.device_type, "desktop");
    assert_eq!(device.browser, "Chrome");
    assert_eq!(device.os, "Windows");
    assert_eq!(device.user_agent, CHROME_WINDOWS);
}

#[test]
fn classifies_tablet_and_mobile_user_agents() {
    let tablet = classify_device(FIREFOX_ANDROID_TABLET);
    assert_eq!(tablet.device_type, "tablet");
    assert_eq!(tablet.browser, "Firefox");
    assert_eq!(tablet.os, "Android");

    let phone = classify_device(SAFARI_IPHONE);
    assert_eq!(phone.device_type, "mobile");
    assert_eq!(phone.browser, "Safari");
    // "like Mac OS X" wins over the later iOS pattern.
    assert_eq!(phone.os, "macOS");
}

#[test]
fn unrecognized_user_agent_falls_back_to_defaults() {
    let device = classify_device("curl/8.4.0");

    assert_eq!(device.device_type, "desktop");
    assert_eq!(device.browser, "unknown");
    assert_eq!(device.os, "unknown");
}

#[test]
fn session_token_is_generated_once_and_persisted() {
    // Arrange
    let storage = Arc::new(MemoryTokenStorage::new());
    let identity = resolver(storage.clone());

    // Act
    let first = identity.session_token();
    let second = identity.session_token();

    // Assert
    assert_eq!(first, second);
    let stored = storage
        .get(&TrackerConfig::default().token_key)
        .expect("read storage");
    assert_eq!(stored.as_deref(), Some(first.as_str()));
}

#[test]
fn unusable_storage_keeps_a_stable_process_token() {
    let identity = resolver(Arc::new(BrokenStorage));

    let first = identity.session_token();
    let second = identity.session_token();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn file_storage_survives_a_new_instance() {
    // Arrange
    let dir = make_temp_dir("token-file");
    let path = dir.join("nested").join("session.json");
    let token = {
        let identity = resolver(Arc::new(FileTokenStorage::new(&path)));
        identity.session_token()
    };

    // Act
    let reopened = resolver(Arc::new(FileTokenStorage::new(&path)));

    // Assert
    assert_eq!(reopened.session_token(), token);
    assert!(path.exists(), "token file should be written");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn corrupt_token_file_is_reported() {
    let dir = make_temp_dir("token-corrupt");
    let path = dir.join("session.json");
    fs::write(&path, "not json").expect("write corrupt file");

    let result = FileTokenStorage::new(&path).get("geotube_session_id");

    assert!(matches!(result, Err(TokenStorageError::Corrupt(_))));

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn repeated_resolution_reuses_the_same_user() {
    // Arrange
    let store = MemoryStore::new();
    let identity = resolver(Arc::new(MemoryTokenStorage::new()));

    // Act
    let first = identity.resolve_user(&store).await;
    let second = identity.resolve_user(&store).await;
    let third = identity.resolve_user(&store).await;

    // Assert
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(store.snapshot().users.len(), 1);
    assert_eq!(store.calls(StoreOp::CreateUser), 1);
    assert_eq!(store.calls(StoreOp::TouchUser), 2);
}

#[tokio::test(start_paused = true)]
async fn resolution_refreshes_last_seen() {
    let store = MemoryStore::new();
    let identity = resolver(Arc::new(MemoryTokenStorage::new()));

    identity.resolve_user(&store).await.expect("first resolution");
    let created = store.snapshot().users[0].last_seen;
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    identity.resolve_user(&store).await.expect("second resolution");

    let user = &store.snapshot().users[0];
    assert_eq!((user.last_seen - created).num_seconds(), 30);
    assert_eq!(user.device.browser, "Chrome");
}

#[tokio::test]
async fn backend_failures_yield_no_user() {
    let identity = resolver(Arc::new(MemoryTokenStorage::new()));

    let lookup_down = MemoryStore::new();
    lookup_down.fail(StoreOp::FindUser);
    assert_eq!(identity.resolve_user(&lookup_down).await, None);
    assert_eq!(lookup_down.calls(StoreOp::CreateUser), 0);

    let create_down = MemoryStore::new();
    create_down.fail(StoreOp::CreateUser);
    assert_eq!(identity.resolve_user(&create_down).await, None);

    let touch_down = MemoryStore::new();
    identity
        .resolve_user(&touch_down)
        .await
        .expect("initial resolution");
    touch_down.fail(StoreOp::TouchUser);
    assert_eq!(identity.resolve_user(&touch_down).await, None);
    assert_eq!(touch_down.snapshot().users.len(), 1);
}
