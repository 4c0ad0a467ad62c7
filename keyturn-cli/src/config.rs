//! CLI configuration handling.
//!
//! Configuration lives in `keyturn.toml` under the platform config directory
//! (or wherever `--config` points). Every section is optional:
//!
//! ```toml
//! [store]
//! kind = "file"              # memory | file | keyring
//! path = "/var/lib/keyturn/secrets.json"
//! service_name = "keyturn"
//!
//! [control_plane]
//! endpoint = "https://gateway.internal/v1"
//! request_timeout_secs = 30
//!
//! [convergence.cache]
//! timeout_secs = 1800
//! min_poll_interval_secs = 10
//! initial_delay_secs = 30
//!
//! [[association]]
//! name = "orders-cache"
//! secret_id = "prod/orders-cache"
//!
//! [[association.targets]]
//! kind = "cache_cluster"
//! replication_group_id = "orders-rg"
//! ```

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use keyturn_core::{ConvergenceSpec, DEFAULT_REQUEST_TIMEOUT, SecretId, StoreKind, TargetDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyturnConfig {
    pub store: StoreConfig,

    pub control_plane: ControlPlaneConfig,

    pub convergence: ConvergenceConfig,

    /// Named association plans, run with `keyturn associate <name>`.
    #[serde(rename = "association")]
    pub associations: Vec<AssociationPlan>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// Secrets file for the `file` backend. Defaults to the platform data dir.
    pub path: Option<PathBuf>,

    /// Keyring service name for the `keyring` backend.
    pub service_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: None,
            service_name: "keyturn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Base URL of the control-plane gateway.
    pub endpoint: Option<String>,

    /// Per-request timeout for gateway calls.
    pub request_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "WaitConfig::cache")]
    pub cache: WaitConfig,

    #[serde(default = "WaitConfig::broker")]
    pub broker: WaitConfig,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            cache: WaitConfig::cache(),
            broker: WaitConfig::broker(),
        }
    }
}

/// Convergence timing in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub timeout_secs: u64,

    #[serde(default)]
    pub min_poll_interval_secs: Option<u64>,

    #[serde(default)]
    pub initial_delay_secs: u64,
}

impl WaitConfig {
    fn cache() -> Self {
        Self::from_spec(&ConvergenceSpec::cache_cluster())
    }

    fn broker() -> Self {
        Self::from_spec(&ConvergenceSpec::broker_reboot())
    }

    fn from_spec(spec: &ConvergenceSpec) -> Self {
        Self {
            timeout_secs: spec.timeout.as_secs(),
            min_poll_interval_secs: spec.min_poll_interval.map(|d| d.as_secs()),
            initial_delay_secs: spec.initial_delay.as_secs(),
        }
    }

    /// Apply these timings to `base`, keeping its statuses.
    pub fn apply_to(&self, base: ConvergenceSpec) -> ConvergenceSpec {
        ConvergenceSpec {
            timeout: Duration::from_secs(self.timeout_secs),
            min_poll_interval: self.min_poll_interval_secs.map(Duration::from_secs),
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            ..base
        }
    }
}

/// A named secret-to-targets association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationPlan {
    pub name: String,

    pub secret_id: SecretId,

    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,
}

impl KeyturnConfig {
    /// Parse a configuration document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse configuration")?;
        config.check_unique_names()?;
        Ok(config)
    }

    /// Look up an association plan by name.
    pub fn association(&self, name: &str) -> Result<&AssociationPlan> {
        self.associations
            .iter()
            .find(|a| a.name == name)
            .with_context(|| {
                format!(
                    "No association named '{}' in {:?}",
                    name, self.config_path
                )
            })
    }

    /// Cache cluster convergence spec with configured timings.
    pub fn cache_spec(&self) -> ConvergenceSpec {
        self.convergence.cache.apply_to(ConvergenceSpec::cache_cluster())
    }

    /// Broker reboot convergence spec with configured timings.
    pub fn broker_spec(&self) -> ConvergenceSpec {
        self.convergence.broker.apply_to(ConvergenceSpec::broker_reboot())
    }

    fn check_unique_names(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for plan in &self.associations {
            if !seen.insert(plan.name.as_str()) {
                bail!("Association '{}' is defined more than once", plan.name);
            }
        }
        Ok(())
    }
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist. A missing file at the default location
/// yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<KeyturnConfig> {
    let (config_path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        KeyturnConfig::from_toml(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else if required {
        bail!("Config file {:?} does not exist", config_path);
    } else {
        KeyturnConfig::default()
    };

    config.config_path = config_path;
    Ok(config)
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("keyturn.toml"))
        .unwrap_or_else(|| PathBuf::from("keyturn.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "keyturn", "keyturn")
}
