//! In-memory secret storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{Secret, SecretStore, StoreError};

/// In-memory secret store for tests and dry runs.
///
/// This store is not persistent; data is lost when the process exits.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Secret>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<String, Secret>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), secret.clone());
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
