//! Domain model types for keyturn.
//!
//! This module defines the identifiers used throughout keyturn:
//! - [`SecretId`] - Identifier of a stored credential bundle
//! - [`RoleKey`] - Name of one role inside a bundle (e.g. `ADMIN_PASSWORD`)
//! - [`RoleSet`] - The roles a deployment recognizes, plus the fallback role
//! - [`GenerationProfile`] - Which roles a bundle-creation run generates

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Identifier of a secret record in the secret store.
///
/// Secret IDs are caller-supplied and stable; they are used verbatim as the
/// storage key and as the first component of every opaque identifier.
///
/// # Examples
///
/// ```
/// use keyturn_core::SecretId;
///
/// let id = SecretId::new("prod/orders-db");
/// assert_eq!(id.as_str(), "prod/orders-db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    /// Create a new secret ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the secret ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SecretId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecretId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Name of a role inside a credential bundle.
///
/// Role keys are upper-snake-case and double as the JSON field names of the
/// stored bundle. Keys are compared exactly: `admin_password` is not
/// `ADMIN_PASSWORD`, and resolves to the fallback role like any other
/// unknown key.
///
/// # Examples
///
/// ```
/// use keyturn_core::RoleKey;
///
/// assert_eq!(RoleKey::new("AUTH_TOKEN"), RoleKey::AUTH_TOKEN);
/// assert_ne!(RoleKey::new("auth_token"), RoleKey::AUTH_TOKEN);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct RoleKey(Cow<'static, str>);

impl RoleKey {
    /// Administrator / master user password.
    pub const ADMIN_PASSWORD: RoleKey = RoleKey(Cow::Borrowed("ADMIN_PASSWORD"));

    /// Application user password.
    pub const USER_PASSWORD: RoleKey = RoleKey(Cow::Borrowed("USER_PASSWORD"));

    /// Read-only user password. Also the fallback for unknown keys.
    pub const READONLY_USER_PASSWORD: RoleKey = RoleKey(Cow::Borrowed("READONLY_USER_PASSWORD"));

    /// Session auth token (cache clusters).
    pub const AUTH_TOKEN: RoleKey = RoleKey(Cow::Borrowed("AUTH_TOKEN"));

    /// Create a role key from its exact name.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    /// Get the role key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RoleKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The roles a deployment recognizes.
///
/// Lookups for keys outside [`known`](RoleSet::known) resolve to
/// [`fallback`](RoleSet::fallback) instead of failing; callers are expected
/// to validate keys before they reach a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    /// Roles that resolve to themselves.
    pub known: Vec<RoleKey>,

    /// Role used for any key not in `known`.
    pub fallback: RoleKey,
}

impl RoleSet {
    /// Create a role set from its known roles and fallback.
    pub fn new(known: Vec<RoleKey>, fallback: RoleKey) -> Self {
        Self { known, fallback }
    }

    /// Whether `key` resolves to itself.
    pub fn is_known(&self, key: &RoleKey) -> bool {
        self.known.contains(key)
    }

    /// The role a lookup for `key` actually reads.
    pub fn resolve<'a>(&'a self, key: &'a RoleKey) -> &'a RoleKey {
        if self.is_known(key) { key } else { &self.fallback }
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self {
            known: vec![
                RoleKey::ADMIN_PASSWORD,
                RoleKey::AUTH_TOKEN,
                RoleKey::READONLY_USER_PASSWORD,
                RoleKey::USER_PASSWORD,
            ],
            fallback: RoleKey::READONLY_USER_PASSWORD,
        }
    }
}

/// Which roles a bundle-creation run generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProfile {
    /// Admin, application and read-only database users.
    Database,

    /// A single cache auth token.
    Cache,

    /// Broker admin and application users.
    Broker,

    /// An explicit role list.
    Custom(Vec<RoleKey>),
}

impl GenerationProfile {
    /// The roles this profile generates, in bundle order.
    pub fn roles(&self) -> Vec<RoleKey> {
        match self {
            Self::Database => vec![
                RoleKey::ADMIN_PASSWORD,
                RoleKey::USER_PASSWORD,
                RoleKey::READONLY_USER_PASSWORD,
            ],
            Self::Cache => vec![RoleKey::AUTH_TOKEN],
            Self::Broker => vec![RoleKey::ADMIN_PASSWORD, RoleKey::USER_PASSWORD],
            Self::Custom(roles) => roles.clone(),
        }
    }

    /// Parse a profile name as used on the command line.
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        match name.to_lowercase().as_str() {
            "database" | "db" => Ok(Self::Database),
            "cache" => Ok(Self::Cache),
            "broker" | "mq" => Ok(Self::Broker),
            other => Err(ParseError::UnknownProfile {
                name: other.to_string(),
            }),
        }
    }
}

/// Error parsing a model value.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown generation profile '{name}' (expected database, cache or broker)")]
    UnknownProfile { name: String },
}
