//! Library half of the `keyturn` CLI: configuration loading and wiring of
//! stores and control planes from that configuration.

pub mod config;
pub mod wiring;

pub use config::{AssociationPlan, KeyturnConfig, load_config};
