//! Credential targets and their control-plane APIs.
//!
//! This module provides:
//! - [`DatabaseApi`], [`CacheApi`], [`BrokerApi`], [`VaultApi`] - the
//!   trigger (and describe) calls each kind of target exposes
//! - [`TargetDescriptor`] - the closed set of target kinds an association
//!   can fan out to
//! - [`Clients`] - one handle per API, as the orchestrator consumes them
//! - [`MemoryControlPlane`] - a simulated control plane for tests and dry runs
//! - [`HttpControlPlane`] (with `http` feature) - JSON gateway client
//!
//! Every trigger call is fire-and-forget from the caller's point of view:
//! success means the control plane accepted the change, not that it has
//! been applied. Waiting is the poller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::poller::Observation;
use crate::store::Secret;

mod descriptor;
mod memory;
mod vault;

#[cfg(feature = "http")]
mod http;

pub use descriptor::{BrokerUser, TargetDescriptor, TargetKind};
pub use memory::{ControlPlaneCall, MemoryControlPlane};
pub use vault::VaultCredentials;

#[cfg(feature = "http")]
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpControlPlane};

/// Error returned by a control-plane call.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The resource does not exist (or is not visible yet).
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// The control plane refused the request.
    #[error("request for {resource} rejected: {message}")]
    Rejected { resource: String, message: String },

    /// The request never got a usable answer.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The client is not set up to make this call.
    #[error("misconfigured client: {message}")]
    Misconfigured { message: String },
}

/// How a new cache auth token is introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthTokenStrategy {
    /// Add the new token alongside the current one.
    Rotate,
    /// Make the new token the only valid one.
    Set,
}

impl AuthTokenStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotate => "ROTATE",
            Self::Set => "SET",
        }
    }
}

/// Status of a control-plane resource as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub status: String,
}

impl From<ResourceState> for Observation<ResourceState> {
    fn from(state: ResourceState) -> Self {
        let status = state.status.clone();
        Observation::new(state, status)
    }
}

/// Managed relational database.
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    /// Replace the master user password, applied immediately.
    async fn modify_master_password(&self, db_id: &str, password: &Secret) -> Result<(), TargetError>;
}

/// Managed cache cluster (replication group).
#[async_trait]
pub trait CacheApi: Send + Sync {
    /// Change the auth token of a replication group.
    async fn modify_auth_token(
        &self,
        group_id: &str,
        token: &Secret,
        strategy: AuthTokenStrategy,
    ) -> Result<(), TargetError>;

    /// Current status of a replication group.
    async fn describe_cache(&self, group_id: &str) -> Result<ResourceState, TargetError>;
}

/// Managed message broker.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Set a broker user's password and console access.
    async fn update_user(
        &self,
        broker_id: &str,
        username: &str,
        password: &Secret,
        console_access: bool,
    ) -> Result<(), TargetError>;

    /// Reboot the broker so pending user changes take effect.
    async fn reboot(&self, broker_id: &str) -> Result<(), TargetError>;

    /// Current status of a broker.
    async fn describe_broker(&self, broker_id: &str) -> Result<ResourceState, TargetError>;
}

/// Access-governance vault holding connection credentials for people.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Replace the stored credential of a vault resource.
    async fn update_credential(
        &self,
        resource_id: &str,
        username: Option<&str>,
        password: &Secret,
    ) -> Result<(), TargetError>;
}

/// The control-plane handles an orchestrator talks to.
///
/// `vault` is `None` when the vault integration is not configured; vault
/// updates are then skipped without error.
#[derive(Clone)]
pub struct Clients {
    pub database: Arc<dyn DatabaseApi>,
    pub cache: Arc<dyn CacheApi>,
    pub broker: Arc<dyn BrokerApi>,
    pub vault: Option<Arc<dyn VaultApi>>,
}

impl Clients {
    /// Use one control plane for every target kind.
    pub fn uniform<P>(plane: Arc<P>) -> Self
    where
        P: DatabaseApi + CacheApi + BrokerApi + VaultApi + 'static,
    {
        Self {
            database: plane.clone(),
            cache: plane.clone(),
            broker: plane.clone(),
            vault: Some(plane),
        }
    }

    /// Disable the vault integration.
    pub fn without_vault(mut self) -> Self {
        self.vault = None;
        self
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("vault_enabled", &self.vault.is_some())
            .finish_non_exhaustive()
    }
}
