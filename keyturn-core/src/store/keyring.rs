//! OS keyring-backed secret storage.

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Secret store on the platform keyring (Keychain, Secret Service,
/// Credential Manager).
///
/// Each secret identifier becomes its own keyring entry with service
/// `{service_name}/{key}`. Platform keyrings cannot enumerate entries, so
/// [`list_keys`](SecretStore::list_keys) always fails with
/// [`StoreError::Backend`].
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Open the keyring under `service_name`.
    ///
    /// Returns [`StoreError::KeyringUnavailable`] when the platform has no
    /// usable keyring backend.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        let probe = format!("{}/__probe__", service_name);
        Entry::new(&probe, "keyturn").map_err(|e| StoreError::KeyringUnavailable {
            message: e.to_string(),
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    /// Service name entries are stored under.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        let service = format!("{}/{}", self.service_name, key);
        Entry::new(&service, "keyturn").map_err(|e| StoreError::Backend {
            message: format!("failed to open keyring entry {}: {}", key, e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::Backend {
                message: format!("ambiguous keyring entry for {}", key),
            }),
            Err(e) => Err(StoreError::Backend {
                message: format!("keyring read failed for {}: {}", key, e),
            }),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| StoreError::Write {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Backend {
            message: format!(
                "keyring backend cannot enumerate entries (prefix: {:?})",
                prefix
            ),
        })
    }
}
