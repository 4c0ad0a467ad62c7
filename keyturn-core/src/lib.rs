//! # Keyturn Core
//!
//! Core library for keyturn credential rotation.
//!
//! This crate provides:
//! - Role-keyed credential bundles and their storage backends
//! - Random credential generation
//! - Control-plane APIs for databases, cache clusters, message brokers and
//!   an access-governance vault
//! - A cancellable convergence poller for asynchronous control planes
//! - The orchestrator that fans a stored bundle out to its targets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keyturn_core::{
//!     BundleStore, Clients, MemoryControlPlane, MemoryStore, Orchestrator, RoleKey, SecretId,
//!     TargetDescriptor,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = Orchestrator::new(
//!     BundleStore::new(MemoryStore::new()),
//!     Clients::uniform(Arc::new(MemoryControlPlane::new())),
//! );
//! let targets = [TargetDescriptor::CacheCluster {
//!     replication_group_id: "rg1".into(),
//!     role: RoleKey::AUTH_TOKEN,
//! }];
//!
//! let id = orchestrator
//!     .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
//!     .await?;
//! assert_eq!(id.as_str(), "s1-rg1");
//! ```

pub mod bundle;
pub mod error;
pub mod generator;
pub mod identity;
pub mod issuer;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod store;
pub mod target;

// Re-export commonly used types at crate root
pub use model::{
    GenerationProfile,
    ParseError,
    RoleKey,
    RoleSet,
    SecretId,
};

pub use bundle::CredentialBundle;

pub use store::{
    BundleStore,
    FileStore,
    MemoryStore,
    Secret,
    SecretStore,
    StoreError,
    StoreKind,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use generator::{
    CredentialGenerator,
    GenerationError,
    OsRandomSource,
    PasswordPolicy,
    RandomSource,
};

pub use target::{
    AuthTokenStrategy,
    BrokerApi,
    BrokerUser,
    CacheApi,
    Clients,
    DatabaseApi,
    MemoryControlPlane,
    TargetDescriptor,
    TargetError,
    VaultApi,
    VaultCredentials,
};

#[cfg(feature = "http")]
pub use target::{DEFAULT_REQUEST_TIMEOUT, HttpControlPlane};

pub use poller::{ConvergenceError, ConvergenceSpec, Observation};

pub use identity::OpaqueIdentifier;

pub use issuer::BundleIssuer;

pub use orchestrator::Orchestrator;

pub use error::RotationError;
