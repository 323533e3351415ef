use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::model::{DeviceInfo, NewUser, UserId};
use crate::store::{RemoteStore, StoreError};

#[derive(Debug, Error)]
pub enum TokenStorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("corrupt token storage: {0}")]
    Corrupt(String),
}

/// Key-value slot that outlives the process (the browser's local storage).
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), TokenStorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStorageError> {
        let slots = self
            .slots
            .lock()
            .map_err(|err| TokenStorageError::Io(err.to_string()))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStorageError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|err| TokenStorageError::Io(err.to_string()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object of key to value on disk.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, TokenStorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read(&self.path)
            .map_err(|err| TokenStorageError::Io(format!("{}: {err}", self.path.display())))?;
        serde_json::from_slice(&raw)
            .map_err(|err| TokenStorageError::Corrupt(format!("{}: {err}", self.path.display())))
    }
}

impl TokenStorage for FileTokenStorage {
    fn get(&self, key: &str) -> Result<Option<String>, TokenStorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStorageError> {
        let mut slots = self.read_all()?;
        slots.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| TokenStorageError::Io(format!("{}: {err}", parent.display())))?;
        }
        let body = serde_json::to_vec_pretty(&slots)
            .map_err(|err| TokenStorageError::Corrupt(err.to_string()))?;
        fs::write(&self.path, body)
            .map_err(|err| TokenStorageError::Io(format!("{}: {err}", self.path.display())))
    }
}

pub fn classify_device(user_agent: &str) -> DeviceInfo {
    let lowered = user_agent.to_ascii_lowercase();
    let device_type = if lowered.contains("mobile") {
        "mobile"
    } else if lowered.contains("tablet") {
        "tablet"
    } else {
        "desktop"
    };

    let first_match = |table: &[(&str, &'static str)]| {
        table
            .iter()
            .find(|(needle, _)| user_agent.contains(needle))
            .map(|(_, label)| *label)
            .unwrap_or("unknown")
    };

    // First match wins; Chrome user agents also contain "Safari".
    let browser = first_match(&[
        ("Firefox", "Firefox"),
        ("Chrome", "Chrome"),
        ("Safari", "Safari"),
        ("Edge", "Edge"),
    ]);
    let os = first_match(&[
        ("Windows", "Windows"),
        ("Mac", "macOS"),
        ("Linux", "Linux"),
        ("Android", "Android"),
        ("iOS", "iOS"),
    ]);

    DeviceInfo {
        device_type: device_type.to_string(),
        browser: browser.to_string(),
        os: os.to_string(),
        user_agent: user_agent.to_string(),
    }
}

/// Anonymous identity for one page lifetime. Built once and shared by reference.
pub struct IdentityResolver {
    storage: Arc<dyn TokenStorage>,
    clock: Arc<dyn Clock>,
    token_key: String,
    user_agent: String,
    fallback: Mutex<Option<String>>,
}

impl IdentityResolver {
    pub fn new(
        storage: Arc<dyn TokenStorage>,
        clock: Arc<dyn Clock>,
        config: &TrackerConfig,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            token_key: config.token_key.clone(),
            user_agent: user_agent.into(),
            fallback: Mutex::new(None),
        }
    }

    pub fn device(&self) -> DeviceInfo {
        classify_device(&self.user_agent)
    }

    /// Persisted token, generated and stored on first use.
    pub fn session_token(&self) -> String {
        match self.storage.get(&self.token_key) {
            Ok(Some(token)) => return token,
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "token storage unreadable, using process-local token");
                return self.fallback_token();
            }
        }

        let token = Uuid::new_v4().to_string();
        if let Err(err) = self.storage.set(&self.token_key, &token) {
            warn!(error = %err, "failed to persist session token");
            return self.fallback_token();
        }
        token
    }

    fn fallback_token(&self) -> String {
        let mut slot = self.fallback.lock().unwrap_or_else(|p| p.into_inner());
        slot.get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Backend user for this browser, or `None` when tracking is unavailable.
    pub async fn resolve_user(&self, store: &dyn RemoteStore) -> Option<UserId> {
        let token = self.session_token();
        let now = self.clock.now();

        match self.lookup_or_create(store, &token, now).await {
            Ok(id) => {
                info!(user_id = %id, "user resolved");
                Some(id)
            }
            Err(err) => {
                error!(op = "resolve_user", error = %err, "error initializing user");
                None
            }
        }
    }

    async fn lookup_or_create(
        &self,
        store: &dyn RemoteStore,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<UserId, StoreError> {
        if let Some(id) = store.find_user(token).await? {
            store.touch_user(&id, now).await?;
            return Ok(id);
        }

        store
            .create_user(&NewUser {
                session_id: token.to_string(),
                device: self.device(),
                last_seen: now,
            })
            .await
    }
}
