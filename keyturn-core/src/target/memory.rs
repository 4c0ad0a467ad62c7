//! In-memory control plane.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{
    AuthTokenStrategy, BrokerApi, CacheApi, DatabaseApi, ResourceState, TargetError, VaultApi,
};
use crate::store::Secret;

/// A call received by a [`MemoryControlPlane`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    ModifyMasterPassword {
        db_id: String,
        password: Secret,
    },
    ModifyAuthToken {
        group_id: String,
        token: Secret,
        strategy: AuthTokenStrategy,
    },
    DescribeCache {
        group_id: String,
    },
    UpdateBrokerUser {
        broker_id: String,
        username: String,
        password: Secret,
        console_access: bool,
    },
    RebootBroker {
        broker_id: String,
    },
    DescribeBroker {
        broker_id: String,
    },
    UpdateVaultCredential {
        resource_id: String,
        username: Option<String>,
        password: Secret,
    },
}

#[derive(Debug)]
struct Resource {
    pending_status: &'static str,
    ready_status: &'static str,
    remaining_pending: usize,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<ControlPlaneCall>,
    resources: HashMap<String, Resource>,
    rejected: HashSet<String>,
    hidden: HashMap<String, usize>,
    forced: HashMap<String, String>,
}

/// Simulated control plane for every target kind.
///
/// Mutations are recorded and accepted. Cache token changes and broker
/// reboots put the resource into its transient status for a configurable
/// number of describe calls before it reports ready again. Resources that
/// were never mutated are not found.
///
/// Used by tests and by `keyturn associate --dry-run`.
#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
    settle_polls: usize,
}

impl MemoryControlPlane {
    /// Create a control plane whose resources are ready on the first describe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the transient status for `polls` describes after each change.
    pub fn with_settle_polls(mut self, polls: usize) -> Self {
        self.settle_polls = polls;
        self
    }

    /// Reject every mutation addressed to `resource_id`.
    pub fn reject(&self, resource_id: &str) {
        self.state.lock().rejected.insert(resource_id.to_string());
    }

    /// Answer the next `polls` describes of `resource_id` with not-found.
    pub fn hide(&self, resource_id: &str, polls: usize) {
        self.state.lock().hidden.insert(resource_id.to_string(), polls);
    }

    /// Always report `status` for `resource_id`.
    pub fn force_status(&self, resource_id: &str, status: &str) {
        self.state
            .lock()
            .forced
            .insert(resource_id.to_string(), status.to_string());
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.state.lock().calls.clone()
    }

    fn mutate(&self, resource_id: &str, call: ControlPlaneCall) -> Result<(), TargetError> {
        let mut state = self.state.lock();
        state.calls.push(call);

        if state.rejected.contains(resource_id) {
            return Err(TargetError::Rejected {
                resource: resource_id.to_string(),
                message: "rejected by control plane".to_string(),
            });
        }

        Ok(())
    }

    fn transition(&self, resource_id: &str, pending_status: &'static str, ready_status: &'static str) {
        self.state.lock().resources.insert(
            resource_id.to_string(),
            Resource {
                pending_status,
                ready_status,
                remaining_pending: self.settle_polls,
            },
        );
    }

    fn describe(&self, resource_id: &str, call: ControlPlaneCall) -> Result<ResourceState, TargetError> {
        let mut state = self.state.lock();
        state.calls.push(call);

        if let Some(remaining) = state.hidden.get_mut(resource_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TargetError::NotFound {
                    resource: resource_id.to_string(),
                });
            }
        }

        if let Some(status) = state.forced.get(resource_id) {
            return Ok(ResourceState {
                id: resource_id.to_string(),
                status: status.clone(),
            });
        }

        let resource = state
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| TargetError::NotFound {
                resource: resource_id.to_string(),
            })?;

        let status = if resource.remaining_pending > 0 {
            resource.remaining_pending -= 1;
            resource.pending_status
        } else {
            resource.ready_status
        };

        Ok(ResourceState {
            id: resource_id.to_string(),
            status: status.to_string(),
        })
    }
}

#[async_trait]
impl DatabaseApi for MemoryControlPlane {
    async fn modify_master_password(&self, db_id: &str, password: &Secret) -> Result<(), TargetError> {
        self.mutate(
            db_id,
            ControlPlaneCall::ModifyMasterPassword {
                db_id: db_id.to_string(),
                password: password.clone(),
            },
        )
    }
}

#[async_trait]
impl CacheApi for MemoryControlPlane {
    async fn modify_auth_token(
        &self,
        group_id: &str,
        token: &Secret,
        strategy: AuthTokenStrategy,
    ) -> Result<(), TargetError> {
        self.mutate(
            group_id,
            ControlPlaneCall::ModifyAuthToken {
                group_id: group_id.to_string(),
                token: token.clone(),
                strategy,
            },
        )?;
        self.transition(group_id, "modifying", "available");
        Ok(())
    }

    async fn describe_cache(&self, group_id: &str) -> Result<ResourceState, TargetError> {
        self.describe(
            group_id,
            ControlPlaneCall::DescribeCache {
                group_id: group_id.to_string(),
            },
        )
    }
}

#[async_trait]
impl BrokerApi for MemoryControlPlane {
    async fn update_user(
        &self,
        broker_id: &str,
        username: &str,
        password: &Secret,
        console_access: bool,
    ) -> Result<(), TargetError> {
        self.mutate(
            broker_id,
            ControlPlaneCall::UpdateBrokerUser {
                broker_id: broker_id.to_string(),
                username: username.to_string(),
                password: password.clone(),
                console_access,
            },
        )
    }

    async fn reboot(&self, broker_id: &str) -> Result<(), TargetError> {
        self.mutate(
            broker_id,
            ControlPlaneCall::RebootBroker {
                broker_id: broker_id.to_string(),
            },
        )?;
        self.transition(broker_id, "REBOOT_IN_PROGRESS", "RUNNING");
        Ok(())
    }

    async fn describe_broker(&self, broker_id: &str) -> Result<ResourceState, TargetError> {
        self.describe(
            broker_id,
            ControlPlaneCall::DescribeBroker {
                broker_id: broker_id.to_string(),
            },
        )
    }
}

#[async_trait]
impl VaultApi for MemoryControlPlane {
    async fn update_credential(
        &self,
        resource_id: &str,
        username: Option<&str>,
        password: &Secret,
    ) -> Result<(), TargetError> {
        self.mutate(
            resource_id,
            ControlPlaneCall::UpdateVaultCredential {
                resource_id: resource_id.to_string(),
                username: username.map(str::to_string),
                password: password.clone(),
            },
        )
    }
}
