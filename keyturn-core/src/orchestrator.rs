//! Credential propagation.
//!
//! [`Orchestrator::rotate_and_propagate`] reads the current bundle for a
//! secret and applies it to each target in declaration order, waiting for
//! asynchronous targets to converge before moving on. The first failure
//! stops the run; targets already updated keep the new credential.
//!
//! Propagation never writes to the secret store.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bundle::CredentialBundle;
use crate::error::RotationError;
use crate::identity::OpaqueIdentifier;
use crate::model::{RoleKey, RoleSet, SecretId};
use crate::poller::{ConvergenceSpec, Observation};
use crate::store::{BundleStore, Secret, SecretStore};
use crate::target::{
    AuthTokenStrategy, BrokerUser, Clients, ResourceState, TargetDescriptor, TargetError,
};

/// Applies stored credentials to their targets.
pub struct Orchestrator<S> {
    store: BundleStore<S>,
    clients: Clients,
    cache_spec: ConvergenceSpec,
    broker_spec: ConvergenceSpec,
    roles: RoleSet,
}

impl<S: SecretStore> Orchestrator<S> {
    /// Create an orchestrator with the default convergence specs and roles.
    pub fn new(store: BundleStore<S>, clients: Clients) -> Self {
        Self {
            store,
            clients,
            cache_spec: ConvergenceSpec::cache_cluster(),
            broker_spec: ConvergenceSpec::broker_reboot(),
            roles: RoleSet::default(),
        }
    }

    /// Replace the convergence specs for cache clusters and broker reboots.
    pub fn with_convergence(
        mut self,
        cache: ConvergenceSpec,
        broker: ConvergenceSpec,
    ) -> Result<Self, RotationError> {
        cache.validate()?;
        broker.validate()?;
        self.cache_spec = cache;
        self.broker_spec = broker;
        Ok(self)
    }

    /// Replace the role set used to resolve role keys.
    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    /// The identifier [`rotate_and_propagate`](Self::rotate_and_propagate)
    /// would return, computed without touching the store or any target.
    pub fn identify(&self, secret_id: &SecretId, targets: &[TargetDescriptor]) -> OpaqueIdentifier {
        identify(secret_id, targets)
    }

    /// Apply the current bundle of `secret_id` to `targets`, in order.
    ///
    /// Cancelling `cancel` interrupts a convergence wait; mutations already
    /// accepted by a control plane are not undone.
    pub async fn rotate_and_propagate(
        &self,
        secret_id: &SecretId,
        targets: &[TargetDescriptor],
        cancel: &CancellationToken,
    ) -> Result<OpaqueIdentifier, RotationError> {
        let bundle = self.store.get(secret_id).await?;
        debug!(
            "Loaded bundle {} with {} roles for {} targets",
            secret_id,
            bundle.len(),
            targets.len()
        );

        for target in targets {
            let ctx = Apply {
                secret_id,
                bundle: &bundle,
                roles: &self.roles,
                label: target.to_string(),
            };
            self.apply(&ctx, target, cancel).await?;
        }

        let id = identify(secret_id, targets);
        info!("Propagated {} to {} targets as {}", secret_id, targets.len(), id);
        Ok(id)
    }

    async fn apply(
        &self,
        ctx: &Apply<'_>,
        target: &TargetDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), RotationError> {
        if target.resource_id().is_empty() {
            debug!("Skipping {} with no identifier", target.kind());
            return Ok(());
        }

        match target {
            TargetDescriptor::Database { db_id, role } => {
                let password = ctx.credential(role)?;
                self.clients
                    .database
                    .modify_master_password(db_id, password)
                    .await
                    .map_err(|source| ctx.mutation_failed(source))?;
            }

            TargetDescriptor::CacheCluster {
                replication_group_id,
                role,
            } => {
                let token = ctx.credential(role)?;
                for strategy in [AuthTokenStrategy::Rotate, AuthTokenStrategy::Set] {
                    self.clients
                        .cache
                        .modify_auth_token(replication_group_id, token, strategy)
                        .await
                        .map_err(|source| ctx.mutation_failed(source))?;
                    debug!("Cache {} accepted {} token", replication_group_id, strategy.as_str());

                    self.wait_for_cache(ctx, replication_group_id, cancel).await?;
                }
            }

            TargetDescriptor::Broker {
                broker_id,
                users,
                vault_id,
            } => {
                for user in users.iter().filter(|u| !u.username.is_empty()) {
                    self.apply_broker_user(ctx, broker_id, user, vault_id.as_deref())
                        .await?;
                }

                self.clients
                    .broker
                    .reboot(broker_id)
                    .await
                    .map_err(|source| ctx.mutation_failed(source))?;
                debug!("Broker {} rebooting", broker_id);

                self.wait_for_broker(ctx, broker_id, cancel).await?;
            }

            TargetDescriptor::VaultEntry {
                vault_id,
                role,
                username,
            } => {
                let password = ctx.credential(role)?;
                self.update_vault(ctx, vault_id, username.as_deref(), password)
                    .await?;
            }
        }

        info!("Applied {} credential to {}", ctx.secret_id, ctx.label);
        Ok(())
    }

    async fn apply_broker_user(
        &self,
        ctx: &Apply<'_>,
        broker_id: &str,
        user: &BrokerUser,
        vault_id: Option<&str>,
    ) -> Result<(), RotationError> {
        let password = ctx.credential(&user.role)?;

        self.clients
            .broker
            .update_user(broker_id, &user.username, password, user.console_access)
            .await
            .map_err(|source| ctx.mutation_failed(source))?;
        debug!("Broker {} user {} updated", broker_id, user.username);

        if user.console_access {
            if let Some(vault_id) = vault_id.filter(|v| !v.is_empty()) {
                self.update_vault(ctx, vault_id, Some(&user.username), password)
                    .await?;
            }
        }

        Ok(())
    }

    async fn update_vault(
        &self,
        ctx: &Apply<'_>,
        vault_id: &str,
        username: Option<&str>,
        password: &Secret,
    ) -> Result<(), RotationError> {
        let Some(vault) = self.clients.vault.as_deref() else {
            debug!("Vault integration not configured, skipping {}", vault_id);
            return Ok(());
        };

        vault
            .update_credential(vault_id, username, password)
            .await
            .map_err(|source| ctx.mutation_failed(source))
    }

    async fn wait_for_cache(
        &self,
        ctx: &Apply<'_>,
        group_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RotationError> {
        let cache = self.clients.cache.as_ref();
        let refresh = move || async move {
            cache
                .describe_cache(group_id)
                .await
                .map(Observation::<ResourceState>::from)
        };

        self.cache_spec
            .wait(refresh, cancel)
            .await
            .map_err(|source| RotationError::Convergence {
                target: ctx.label.clone(),
                source,
            })?;
        Ok(())
    }

    async fn wait_for_broker(
        &self,
        ctx: &Apply<'_>,
        broker_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RotationError> {
        let broker = self.clients.broker.as_ref();
        let refresh = move || async move {
            broker
                .describe_broker(broker_id)
                .await
                .map(Observation::<ResourceState>::from)
        };

        self.broker_spec
            .wait(refresh, cancel)
            .await
            .map_err(|source| RotationError::Convergence {
                target: ctx.label.clone(),
                source,
            })?;
        Ok(())
    }
}

/// Compose the association identifier for `secret_id` and `targets`.
pub fn identify(secret_id: &SecretId, targets: &[TargetDescriptor]) -> OpaqueIdentifier {
    let components = std::iter::once(secret_id.as_str())
        .chain(targets.iter().flat_map(|t| t.identity_components()));
    OpaqueIdentifier::from_components(components)
}

/// Per-target context for one propagation run.
struct Apply<'a> {
    secret_id: &'a SecretId,
    bundle: &'a CredentialBundle,
    roles: &'a RoleSet,
    label: String,
}

impl Apply<'_> {
    fn credential(&self, role: &RoleKey) -> Result<&Secret, RotationError> {
        self.bundle
            .get_in(role, self.roles)
            .ok_or_else(|| RotationError::MissingCredential {
                secret_id: self.secret_id.to_string(),
                role: self.roles.resolve(role).clone(),
            })
    }

    fn mutation_failed(&self, source: TargetError) -> RotationError {
        RotationError::TargetMutation {
            target: self.label.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::target::{ControlPlaneCall, MemoryControlPlane};
    use std::sync::Arc;
    use std::time::Duration;

    /// Helper to build an orchestrator over a seeded memory store.
    async fn orchestrator(
        plane: Arc<MemoryControlPlane>,
        bundle: CredentialBundle,
    ) -> Orchestrator<MemoryStore> {
        let store = BundleStore::new(MemoryStore::new());
        store.put(&SecretId::new("s1"), &bundle).await.unwrap();
        Orchestrator::new(store, Clients::uniform(plane))
    }

    fn db_bundle() -> CredentialBundle {
        CredentialBundle::new()
            .with(RoleKey::ADMIN_PASSWORD, "admin")
            .with(RoleKey::USER_PASSWORD, "user")
            .with(RoleKey::READONLY_USER_PASSWORD, "reader")
    }

    fn database(db_id: &str) -> TargetDescriptor {
        TargetDescriptor::Database {
            db_id: db_id.to_string(),
            role: RoleKey::ADMIN_PASSWORD,
        }
    }

    fn touched(calls: &[ControlPlaneCall], db: &str) -> bool {
        calls.iter().any(|c| {
            matches!(c, ControlPlaneCall::ModifyMasterPassword { db_id, .. } if db_id == db)
        })
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let plane = Arc::new(MemoryControlPlane::new());
        plane.reject("db-a");
        let orchestrator = orchestrator(plane.clone(), db_bundle()).await;

        let result = orchestrator
            .rotate_and_propagate(
                &SecretId::new("s1"),
                &[database("db-a"), database("db-b")],
                &CancellationToken::new(),
            )
            .await;

        match result {
            Err(RotationError::TargetMutation { target, source }) => {
                assert_eq!(target, "database db-a");
                assert!(matches!(source, TargetError::Rejected { .. }));
            }
            other => panic!("unexpected result {:?}", other),
        }
        let calls = plane.calls();
        assert!(touched(&calls, "db-a"));
        assert!(!touched(&calls, "db-b"));
    }

    #[tokio::test]
    async fn test_missing_secret_touches_nothing() {
        let plane = Arc::new(MemoryControlPlane::new());
        let orchestrator = orchestrator(plane.clone(), db_bundle()).await;

        let result = orchestrator
            .rotate_and_propagate(
                &SecretId::new("unknown"),
                &[database("db-a")],
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(RotationError::Store(_))));
        assert!(plane.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_value_is_an_error() {
        let plane = Arc::new(MemoryControlPlane::new());
        let bundle = CredentialBundle::new().with(RoleKey::AUTH_TOKEN, "tok");
        let orchestrator = orchestrator(plane.clone(), bundle).await;

        let result = orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &[database("db-a")], &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RotationError::MissingCredential { ref role, .. }) if *role == RoleKey::ADMIN_PASSWORD
        ));
        assert!(plane.calls().is_empty());
    }

    #[tokio::test]
    async fn test_database_uses_role_value_and_fallback() {
        let plane = Arc::new(MemoryControlPlane::new());
        let orchestrator = orchestrator(plane.clone(), db_bundle()).await;
        let targets = [TargetDescriptor::Database {
            db_id: "orders".to_string(),
            role: RoleKey::new("SOMETHING_ELSE"),
        }];

        orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            plane.calls(),
            vec![ControlPlaneCall::ModifyMasterPassword {
                db_id: "orders".to_string(),
                password: Secret::new("reader"),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_reboots_once_after_all_users() {
        let plane = Arc::new(MemoryControlPlane::new().with_settle_polls(2));
        let orchestrator = orchestrator(plane.clone(), db_bundle()).await;
        let targets = [TargetDescriptor::Broker {
            broker_id: "b-1".to_string(),
            users: vec![
                BrokerUser {
                    username: "admin".to_string(),
                    console_access: true,
                    role: RoleKey::ADMIN_PASSWORD,
                },
                BrokerUser {
                    username: "app".to_string(),
                    console_access: false,
                    role: RoleKey::USER_PASSWORD,
                },
            ],
            vault_id: Some("rs-9".to_string()),
        }];

        let id = orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(id.as_str(), "s1-b-1-rs-9");

        let calls = plane.calls();
        let reboots: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, ControlPlaneCall::RebootBroker { .. }))
            .map(|(i, _)| i)
            .collect();
        let last_user = calls
            .iter()
            .rposition(|c| matches!(c, ControlPlaneCall::UpdateBrokerUser { .. }))
            .unwrap();

        assert_eq!(reboots.len(), 1);
        assert!(reboots[0] > last_user);

        // Only the console user is mirrored to the vault.
        let vault_users: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                ControlPlaneCall::UpdateVaultCredential { username, .. } => username.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(vault_users, vec!["admin".to_string()]);

        // Two pending describes, then RUNNING.
        let describes = calls
            .iter()
            .filter(|c| matches!(c, ControlPlaneCall::DescribeBroker { .. }))
            .count();
        assert_eq!(describes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_rotates_then_sets() {
        let plane = Arc::new(MemoryControlPlane::new());
        let bundle = CredentialBundle::new().with(RoleKey::AUTH_TOKEN, "tok");
        let orchestrator = orchestrator(plane.clone(), bundle).await;
        let targets = [TargetDescriptor::CacheCluster {
            replication_group_id: "rg1".to_string(),
            role: RoleKey::AUTH_TOKEN,
        }];

        orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
            .await
            .unwrap();

        let strategies: Vec<_> = plane
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ControlPlaneCall::ModifyAuthToken { strategy, .. } => Some(strategy),
                _ => None,
            })
            .collect();
        assert_eq!(strategies, vec![AuthTokenStrategy::Rotate, AuthTokenStrategy::Set]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vault_disabled_is_a_no_op() {
        let plane = Arc::new(MemoryControlPlane::new());
        let store = BundleStore::new(MemoryStore::new());
        store.put(&SecretId::new("s1"), &db_bundle()).await.unwrap();
        let orchestrator = Orchestrator::new(store, Clients::uniform(plane.clone()).without_vault());
        let targets = [TargetDescriptor::VaultEntry {
            vault_id: "rs-1".to_string(),
            role: RoleKey::ADMIN_PASSWORD,
            username: None,
        }];

        let id = orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(id.as_str(), "s1-rs-1");
        assert!(plane.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_cache_status_is_convergence_error() {
        let plane = Arc::new(MemoryControlPlane::new());
        plane.force_status("rg1", "incompatible-parameters");
        let bundle = CredentialBundle::new().with(RoleKey::AUTH_TOKEN, "tok");
        let orchestrator = orchestrator(plane.clone(), bundle).await;
        let targets = [TargetDescriptor::CacheCluster {
            replication_group_id: "rg1".to_string(),
            role: RoleKey::AUTH_TOKEN,
        }];

        let result = orchestrator
            .rotate_and_propagate(&SecretId::new("s1"), &targets, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RotationError::Convergence {
                source: crate::poller::ConvergenceError::UnexpectedState { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_convergence_spec_rejected() {
        let plane = Arc::new(MemoryControlPlane::new());
        let mut cache = ConvergenceSpec::cache_cluster();
        cache.min_poll_interval = Some(Duration::from_secs(3600));

        let result = Orchestrator::new(BundleStore::new(MemoryStore::new()), Clients::uniform(plane))
            .with_convergence(cache, ConvergenceSpec::broker_reboot());

        assert!(matches!(result, Err(RotationError::Spec(_))));
    }

    #[test]
    fn test_identify_matches_declared_order() {
        let targets = [
            TargetDescriptor::Database {
                db_id: "orders".to_string(),
                role: RoleKey::READONLY_USER_PASSWORD,
            },
            TargetDescriptor::VaultEntry {
                vault_id: "rs-1".to_string(),
                role: RoleKey::READONLY_USER_PASSWORD,
                username: None,
            },
        ];

        let id = identify(&SecretId::new("s1"), &targets);
        assert_eq!(id.as_str(), "s1-READONLY_USER_PASSWORD-orders-rs-1");
    }
}
