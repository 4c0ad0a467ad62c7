//! Secret storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for raw key/value secret backends
//! - [`MemoryStore`] - In-memory implementation for tests and dry runs
//! - [`FileStore`] - JSON file implementation under the platform data directory
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`BundleStore`] - Typed get/put of [`CredentialBundle`]s over any backend
//! - [`create_store`] - Helper to select a backend
//!
//! # Storage Key Convention
//!
//! The raw key is the secret identifier itself. The stored value is the
//! bundle serialized as a JSON object with upper-snake role keys.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyturn_core::store::{BundleStore, MemoryStore};
//! use keyturn_core::{CredentialBundle, RoleKey, SecretId};
//!
//! let store = BundleStore::new(MemoryStore::new());
//! let id = SecretId::new("cache/primary");
//!
//! let bundle = CredentialBundle::new().with(RoleKey::AUTH_TOKEN, "tok");
//! store.put(&id, &bundle).await?;
//!
//! let current = store.get(&id).await?;
//! assert_eq!(current.get(&RoleKey::AUTH_TOKEN).unwrap().expose(), "tok");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::bundle::CredentialBundle;
use crate::model::SecretId;

mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use file::FileStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the backing memory is zeroized when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the requested secret identifier.
    #[error("secret not found: {key}")]
    NotFound { key: String },

    /// The stored payload does not parse as a credential bundle.
    #[error("stored value for {key} is not a credential bundle: {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend rejected a write.
    #[error("failed to write secret {key}: {message}")]
    Write { key: String, message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Serialization failed before reaching the backend.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over raw key/value secret backends.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for tests
/// - [`FileStore`] - JSON file on disk
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret at the given key.
    ///
    /// Overwrites any existing value.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// List all keys matching a prefix.
    ///
    /// Returns an empty vec if no keys match.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Check if a key exists without retrieving the value.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        (**self).set(key, secret).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_keys(prefix).await
    }
}

/// Typed access to credential bundles stored in a [`SecretStore`].
///
/// This is the only component that knows the bundle wire shape. Writes
/// replace the current value; no history is retained.
pub struct BundleStore<S> {
    backend: S,
}

impl<S: SecretStore> BundleStore<S> {
    /// Wrap a raw backend.
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    /// Access the underlying backend.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Read the current bundle for `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no record exists
    /// - [`StoreError::Deserialization`] if the payload is not a bundle
    pub async fn get(&self, id: &SecretId) -> Result<CredentialBundle, StoreError> {
        let raw = self
            .backend
            .get(id.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound {
                key: id.to_string(),
            })?;

        serde_json::from_str(raw.expose()).map_err(|source| StoreError::Deserialization {
            key: id.to_string(),
            source,
        })
    }

    /// Replace the current bundle for `id`.
    pub async fn put(&self, id: &SecretId, bundle: &CredentialBundle) -> Result<(), StoreError> {
        let payload = Secret::new(serde_json::to_string(bundle)?);

        self.backend
            .set(id.as_str(), &payload)
            .await
            .map_err(|e| match e {
                StoreError::Write { .. } => e,
                other => StoreError::Write {
                    key: id.to_string(),
                    message: other.to_string(),
                },
            })?;

        tracing::debug!("Stored bundle {} with {} roles", id, bundle.len());
        Ok(())
    }

    /// List the secret identifiers known to the backend.
    pub async fn list(&self) -> Result<Vec<SecretId>, StoreError> {
        let mut keys = self.backend.list_keys("").await?;
        keys.sort();
        Ok(keys.into_iter().map(SecretId::new).collect())
    }
}

/// Which raw backend to build in [`create_store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local map; nothing persists.
    Memory,
    /// JSON file on disk.
    #[default]
    File,
    /// OS keyring.
    Keyring,
}

/// Create a secret store for the requested backend.
///
/// # Backend Selection Logic
///
/// - `File`: a [`FileStore`] at `path`, or at [`FileStore::default_path`]
/// - `Keyring` with the `keyring-store` feature: a [`KeyringStore`] named
///   `service_name`, falling back to [`MemoryStore`] with a warning when the
///   keyring is unavailable
/// - Otherwise: [`MemoryStore`]
pub fn create_store(
    kind: StoreKind,
    path: Option<PathBuf>,
    service_name: &str,
) -> Result<Box<dyn SecretStore>, StoreError> {
    match kind {
        StoreKind::File => {
            let path = match path {
                Some(p) => p,
                None => FileStore::default_path()?,
            };
            tracing::debug!("Using file secret storage at {:?}", path);
            Ok(Box::new(FileStore::load_from_path(path)?))
        }
        StoreKind::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new(service_name) {
                Ok(store) => {
                    tracing::info!("Using OS keyring for secret storage");
                    return Ok(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "Keyring unavailable ({}), falling back to memory store. \
                         Bundles will not persist across runs.",
                        e
                    );
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage for {} requested but keyring-store feature not enabled. \
                 Using memory store.",
                service_name
            );

            Ok(Box::new(MemoryStore::new()))
        }
        StoreKind::Memory => {
            tracing::debug!("Using in-memory secret storage");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleKey;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_bundle_store_put_get() {
        let store = BundleStore::new(MemoryStore::new());
        let id = SecretId::new("db/orders");
        let bundle = CredentialBundle::new()
            .with(RoleKey::ADMIN_PASSWORD, "a")
            .with(RoleKey::READONLY_USER_PASSWORD, "r");

        store.put(&id, &bundle).await.unwrap();
        let read = store.get(&id).await.unwrap();

        assert_eq!(read, bundle);
    }

    #[tokio::test]
    async fn test_bundle_store_wire_shape_omits_absent_roles() {
        let store = BundleStore::new(MemoryStore::new());
        let id = SecretId::new("cache/primary");
        let bundle = CredentialBundle::new().with(RoleKey::AUTH_TOKEN, "tok");

        store.put(&id, &bundle).await.unwrap();

        let raw = store.backend().get("cache/primary").await.unwrap().unwrap();
        assert_eq!(raw.expose(), r#"{"AUTH_TOKEN":"tok"}"#);
    }

    #[tokio::test]
    async fn test_bundle_store_not_found() {
        let store = BundleStore::new(MemoryStore::new());
        let result = store.get(&SecretId::new("missing")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_bundle_store_malformed_payload() {
        let backend = MemoryStore::new();
        backend
            .set("broken", &Secret::new("not json at all"))
            .await
            .unwrap();
        let store = BundleStore::new(backend);

        let result = store.get(&SecretId::new("broken")).await;
        assert!(matches!(result, Err(StoreError::Deserialization { .. })));
    }

    #[tokio::test]
    async fn test_bundle_store_wrong_shape_payload() {
        let backend = MemoryStore::new();
        backend
            .set("array", &Secret::new(r#"["ADMIN_PASSWORD"]"#))
            .await
            .unwrap();
        let store = BundleStore::new(backend);

        let result = store.get(&SecretId::new("array")).await;
        assert!(matches!(result, Err(StoreError::Deserialization { .. })));
    }

    #[tokio::test]
    async fn test_create_store_memory() {
        let store = create_store(StoreKind::Memory, None, "keyturn-test").unwrap();

        store.set("test-key", &Secret::new("test")).await.unwrap();
        let retrieved = store.get("test-key").await.unwrap();
        assert!(retrieved.is_some());
    }

    #[tokio::test]
    async fn test_create_store_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("secrets.json");

        let store = create_store(StoreKind::File, Some(path.clone()), "keyturn-test").unwrap();
        store.set("a", &Secret::new("1")).await.unwrap();

        assert!(path.exists());
    }
}
