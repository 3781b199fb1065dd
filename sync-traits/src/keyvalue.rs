//! Key-Value Settings Storage
//!
//! Small persistence surface the synchronizer uses for its own state: the
//! database-level change token and the device identifier. Hosts back it with
//! whatever their platform offers (UserDefaults, SharedPreferences, a config
//! file).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::adapter::AdapterResult;

/// String key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value.
    async fn get_string(&self, key: &str) -> AdapterResult<Option<String>>;

    /// Store a value.
    async fn set_string(&self, key: &str, value: &str) -> AdapterResult<()>;

    /// Remove a value.
    async fn remove(&self, key: &str) -> AdapterResult<()>;
}

/// In-memory [`KeyValueStore`] for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_string(&self, key: &str) -> AdapterResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> AdapterResult<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AdapterResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}
