//! Target descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::RoleKey;

fn readonly_role() -> RoleKey {
    RoleKey::READONLY_USER_PASSWORD
}

fn auth_token_role() -> RoleKey {
    RoleKey::AUTH_TOKEN
}

/// Which kind of system a descriptor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Database,
    CacheCluster,
    Broker,
    VaultEntry,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Database => "database",
            Self::CacheCluster => "cache-cluster",
            Self::Broker => "broker",
            Self::VaultEntry => "vault-entry",
        };
        f.write_str(name)
    }
}

/// One broker user to update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerUser {
    /// Broker username. Users with an empty name are skipped.
    pub username: String,

    /// Whether the user may log in to the broker web console. Console users
    /// are also mirrored to the broker's vault entry.
    #[serde(default)]
    pub console_access: bool,

    /// Bundle role holding this user's password.
    #[serde(default = "readonly_role")]
    pub role: RoleKey,
}

/// A system that receives a credential from a bundle.
///
/// Empty identifiers are allowed; the corresponding mutation is skipped and
/// the identifier contributes nothing to the association identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// Managed database master password. Acknowledged synchronously.
    Database {
        db_id: String,
        #[serde(default = "readonly_role")]
        role: RoleKey,
    },

    /// Managed cache cluster auth token. Converges asynchronously.
    CacheCluster {
        replication_group_id: String,
        #[serde(default = "auth_token_role")]
        role: RoleKey,
    },

    /// Message broker users, followed by one reboot.
    Broker {
        broker_id: String,
        #[serde(default)]
        users: Vec<BrokerUser>,
        /// Vault entry mirroring console users' credentials.
        #[serde(default)]
        vault_id: Option<String>,
    },

    /// Access-governance vault entry.
    VaultEntry {
        vault_id: String,
        #[serde(default = "readonly_role")]
        role: RoleKey,
        #[serde(default)]
        username: Option<String>,
    },
}

impl TargetDescriptor {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Database { .. } => TargetKind::Database,
            Self::CacheCluster { .. } => TargetKind::CacheCluster,
            Self::Broker { .. } => TargetKind::Broker,
            Self::VaultEntry { .. } => TargetKind::VaultEntry,
        }
    }

    /// Primary identifier of the target system.
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Database { db_id, .. } => db_id,
            Self::CacheCluster {
                replication_group_id,
                ..
            } => replication_group_id,
            Self::Broker { broker_id, .. } => broker_id,
            Self::VaultEntry { vault_id, .. } => vault_id,
        }
    }

    /// Components this target adds to the association identifier, in order.
    ///
    /// Database targets include their role key so that two associations of
    /// one secret to one database under different roles stay distinct.
    pub fn identity_components(&self) -> Vec<&str> {
        match self {
            Self::Database { db_id, role } => vec![role.as_str(), db_id],
            Self::CacheCluster {
                replication_group_id,
                ..
            } => vec![replication_group_id],
            Self::Broker {
                broker_id, vault_id, ..
            } => vec![broker_id, vault_id.as_deref().unwrap_or("")],
            Self::VaultEntry { vault_id, .. } => vec![vault_id],
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.resource_id())
    }
}
