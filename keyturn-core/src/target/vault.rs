//! Vault integration credentials.

use crate::store::Secret;

/// Environment variable holding the vault API access key.
pub const ACCESS_KEY_VAR: &str = "KEYTURN_VAULT_ACCESS_KEY";

/// Environment variable holding the vault API secret key.
pub const SECRET_KEY_VAR: &str = "KEYTURN_VAULT_SECRET_KEY";

/// API key pair for the access-governance vault.
///
/// The vault integration is optional. When either key is missing or empty,
/// there are no credentials and vault updates become no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultCredentials {
    pub access_key: Secret,
    pub secret_key: Secret,
}

impl VaultCredentials {
    /// Read the key pair from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the key pair through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key = lookup(ACCESS_KEY_VAR).filter(|v| !v.is_empty())?;
        let secret_key = lookup(SECRET_KEY_VAR).filter(|v| !v.is_empty())?;

        Some(Self {
            access_key: Secret::new(access_key),
            secret_key: Secret::new(secret_key),
        })
    }
}
