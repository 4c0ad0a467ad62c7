//! Builds stores, control-plane clients and orchestrators from configuration.

use anyhow::{Context, Result};
use keyturn_core::{
    BundleIssuer, BundleStore, Clients, CredentialGenerator, HttpControlPlane,
    MemoryControlPlane, OsRandomSource, Orchestrator, SecretStore, VaultCredentials, create_store,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{ControlPlaneConfig, KeyturnConfig, StoreConfig};

/// Bundle store over whichever backend the configuration selects.
pub type DynBundleStore = BundleStore<Box<dyn SecretStore>>;

/// Open the configured secret store.
pub fn open_store(config: &StoreConfig) -> Result<DynBundleStore> {
    let backend = create_store(config.kind, config.path.clone(), &config.service_name)
        .context("Failed to open secret store")?;
    Ok(BundleStore::new(backend))
}

/// Control-plane clients for a run.
pub struct ControlPlane {
    pub clients: Clients,

    /// Set for dry runs so the recorded calls can be reported.
    pub simulated: Option<Arc<MemoryControlPlane>>,
}

/// Build control-plane clients.
///
/// Dry runs use a [`MemoryControlPlane`]. Otherwise the gateway endpoint is
/// required, and the vault integration is enabled only when both vault keys
/// are present in the environment.
pub fn connect(config: &ControlPlaneConfig, dry_run: bool) -> Result<ControlPlane> {
    let vault = VaultCredentials::from_env();

    if dry_run {
        debug!("Using simulated control plane");
        let plane = Arc::new(MemoryControlPlane::new());
        let mut clients = Clients::uniform(plane.clone());
        if vault.is_none() {
            clients = clients.without_vault();
        }
        return Ok(ControlPlane {
            clients,
            simulated: Some(plane),
        });
    }

    let endpoint = config
        .endpoint
        .as_deref()
        .context("No control_plane.endpoint configured (use --dry-run to simulate)")?;

    let vault_enabled = vault.is_some();
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let plane = HttpControlPlane::with_timeout(endpoint, timeout)
        .context("Failed to create control plane client")?
        .with_vault_credentials(vault);
    let plane = Arc::new(plane);
    let mut clients = Clients::uniform(plane);
    if !vault_enabled {
        info!("Vault keys not set; vault updates will be skipped");
        clients = clients.without_vault();
    }

    Ok(ControlPlane {
        clients,
        simulated: None,
    })
}

/// Build an orchestrator with the configured store and convergence timings.
pub fn orchestrator(config: &KeyturnConfig, clients: Clients) -> Result<Orchestrator<Box<dyn SecretStore>>> {
    let store = open_store(&config.store)?;
    let orchestrator = Orchestrator::new(store, clients)
        .with_convergence(config.cache_spec(), config.broker_spec())
        .context("Invalid convergence configuration")?;
    Ok(orchestrator)
}

/// Build a bundle issuer over the configured store.
pub fn issuer(config: &KeyturnConfig) -> Result<BundleIssuer<Box<dyn SecretStore>>> {
    let store = open_store(&config.store)?;
    Ok(BundleIssuer::new(store, CredentialGenerator::new(OsRandomSource)))
}
