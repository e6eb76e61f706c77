use std::{collections::BTreeMap, path::PathBuf, sync::Mutex};

use async_trait::async_trait;

use crate::{config, error::Error, types::PkceSession};

pub const KEY_AUTH_TOKEN: &str = "auth_token";
const PKCE_SESSION_PREFIX: &str = "pkce_session:";

pub fn pkce_session_key(state: &str) -> String {
    format!("{PKCE_SESSION_PREFIX}{state}")
}

/// Client-side key/value storage for the token and pending PKCE sessions.
///
/// Values are JSON strings. Implementations hold no logic beyond plain
/// key/value access; expiry and single-use rules live in the auth flow.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn keys(&self) -> Result<Vec<String>, Error>;
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: String) -> Result<(), Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;
    async fn clear(&self) -> Result<(), Error>;
}

/// Serializes `value` into the store under `key`.
pub async fn store_json<T: serde::Serialize>(
    store: &dyn TokenStore,
    key: &str,
    value: &T,
) -> Result<(), Error> {
    store.set(key, serde_json::to_string(value)?).await
}

/// Reads and deserializes `key`, `None` when absent.
pub async fn load_json<T: serde::de::DeserializeOwned>(
    store: &dyn TokenStore,
    key: &str,
) -> Result<Option<T>, Error> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// State nonces of every PKCE session in the store.
pub async fn pkce_session_states(store: &dyn TokenStore) -> Result<Vec<String>, Error> {
    Ok(store
        .keys()
        .await?
        .into_iter()
        .filter_map(|key| key.strip_prefix(PKCE_SESSION_PREFIX).map(str::to_string))
        .collect())
}

/// Removes and returns the PKCE session stored for `state`.
pub async fn take_pkce_session(
    store: &dyn TokenStore,
    state: &str,
) -> Result<Option<PkceSession>, Error> {
    let key = pkce_session_key(state);
    let session = load_json(store, &key).await?;
    if session.is_some() {
        store.remove(&key).await?;
    }
    Ok(session)
}

/// Store backed by a single JSON file in the local data directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data_local_dir>/lyricsync/cache/session.json`
    pub fn default_location() -> Self {
        let mut path = config::data_dir();
        path.push("cache/session.json");
        Self::new(path)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        match async_fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.load().await?.into_keys().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Error> {
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries().keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Error> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.entries().clear();
        Ok(())
    }
}
