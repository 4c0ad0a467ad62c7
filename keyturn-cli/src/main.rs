//! keyturn CLI
//!
//! Issues credential bundles and propagates them to their targets.
//!
//! # Usage
//!
//! ```bash
//! # Generate a database bundle
//! keyturn generate prod/orders --profile database
//!
//! # Push it to the targets of a configured association
//! keyturn associate orders-db
//!
//! # Print the association identifier without touching anything
//! keyturn identify orders-db
//!
//! # Show which roles a bundle holds (values stay redacted)
//! keyturn show prod/orders
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyturn_cli::{config, wiring};
use keyturn_core::{GenerationProfile, SecretId, orchestrator};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "keyturn")]
#[command(about = "Credential rotation and propagation for managed infrastructure")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new credential bundle
    Generate {
        /// Secret identifier to store the bundle under
        secret_id: String,

        /// Roles to generate (database, cache, broker)
        #[arg(short, long, default_value = "database")]
        profile: String,
    },

    /// Apply a bundle to the targets of a configured association
    Associate {
        /// Association name from the configuration file
        name: String,

        /// Use a simulated control plane and report the calls it received
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the identifier of a configured association
    Identify {
        /// Association name from the configuration file
        name: String,
    },

    /// Show the roles held by a bundle
    Show {
        /// Secret identifier
        secret_id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List stored secret identifiers
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate { secret_id, profile } => {
            generate(&config, &secret_id, &profile).await
        }
        Commands::Associate { name, dry_run } => {
            associate(&config, &name, dry_run).await
        }
        Commands::Identify { name } => {
            identify(&config, &name)
        }
        Commands::Show { secret_id, format } => {
            show(&config, &secret_id, &format).await
        }
        Commands::List => {
            list(&config).await
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn generate(config: &config::KeyturnConfig, secret_id: &str, profile: &str) -> Result<()> {
    let profile = GenerationProfile::from_name(profile)?;
    let issuer = wiring::issuer(config)?;

    let id = issuer
        .issue(&SecretId::new(secret_id), &profile)
        .await
        .with_context(|| format!("Failed to generate bundle {}", secret_id))?;

    println!("{}", id);
    Ok(())
}

async fn associate(config: &config::KeyturnConfig, name: &str, dry_run: bool) -> Result<()> {
    let plan = config.association(name)?;
    let plane = wiring::connect(&config.control_plane, dry_run)?;
    let orchestrator = wiring::orchestrator(config, plane.clients.clone())?;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping after the current step");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator
        .rotate_and_propagate(&plan.secret_id, &plan.targets, &cancel)
        .await;
    ctrl_c.abort();

    let id = result.with_context(|| format!("Association '{}' failed", name))?;

    if let Some(simulated) = plane.simulated {
        for call in simulated.calls() {
            eprintln!("  {:?}", call);
        }
    }

    println!("{}", id);
    Ok(())
}

fn identify(config: &config::KeyturnConfig, name: &str) -> Result<()> {
    let plan = config.association(name)?;
    println!("{}", orchestrator::identify(&plan.secret_id, &plan.targets));
    Ok(())
}

async fn show(config: &config::KeyturnConfig, secret_id: &str, format: &str) -> Result<()> {
    let store = wiring::open_store(&config.store)?;
    let bundle = store
        .get(&SecretId::new(secret_id))
        .await
        .with_context(|| format!("Failed to read bundle {}", secret_id))?;

    match format {
        "json" => {
            let roles: serde_json::Map<String, serde_json::Value> = bundle
                .role_keys()
                .map(|role| (role.to_string(), serde_json::Value::from("[REDACTED]")))
                .collect();
            println!("{}", serde_json::to_string_pretty(&roles)?);
        }
        _ => {
            println!("{}:", secret_id);
            for role in bundle.role_keys() {
                println!("  {} = [REDACTED]", role);
            }
        }
    }
    Ok(())
}

async fn list(config: &config::KeyturnConfig) -> Result<()> {
    let store = wiring::open_store(&config.store)?;
    for id in store.list().await.context("Failed to list secrets")? {
        println!("{}", id);
    }
    Ok(())
}
