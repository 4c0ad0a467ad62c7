//! Role-keyed credential bundles.
//!
//! A [`CredentialBundle`] is the unit that is generated, stored and read as
//! a whole. It serializes as a flat JSON object whose field names are the
//! role keys; roles without a value are omitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{RoleKey, RoleSet};
use crate::store::Secret;

/// The role-keyed set of credential values for one secret identifier.
///
/// # Example
///
/// ```
/// use keyturn_core::{CredentialBundle, RoleKey};
///
/// let bundle = CredentialBundle::new()
///     .with(RoleKey::ADMIN_PASSWORD, "admin")
///     .with(RoleKey::READONLY_USER_PASSWORD, "reader");
///
/// // Unknown keys fall back to the read-only user.
/// let value = bundle.get(&RoleKey::new("NOT_A_ROLE")).unwrap();
/// assert_eq!(value.expose(), "reader");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<RoleKey, Secret>", into = "BTreeMap<RoleKey, Secret>")]
pub struct CredentialBundle {
    roles: BTreeMap<RoleKey, Secret>,
}

impl CredentialBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, role: RoleKey, value: impl Into<String>) -> Self {
        self.insert(role, Secret::new(value));
        self
    }

    /// Assign a value to a role. Empty values leave the role absent.
    pub fn insert(&mut self, role: RoleKey, value: Secret) {
        if value.is_empty() {
            self.roles.remove(&role);
        } else {
            self.roles.insert(role, value);
        }
    }

    /// Look up a role using the default [`RoleSet`].
    ///
    /// Keys outside the standard roles resolve to `READONLY_USER_PASSWORD`.
    /// Returns `None` only when the resolved role has no value.
    pub fn get(&self, key: &RoleKey) -> Option<&Secret> {
        self.get_in(key, &RoleSet::default())
    }

    /// Look up a role using an explicit [`RoleSet`].
    pub fn get_in(&self, key: &RoleKey, roles: &RoleSet) -> Option<&Secret> {
        self.roles.get(roles.resolve(key))
    }

    /// Role keys present in this bundle, in serialization order.
    pub fn role_keys(&self) -> impl Iterator<Item = &RoleKey> {
        self.roles.keys()
    }

    /// Number of roles with a value.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no role has a value.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl From<BTreeMap<RoleKey, Secret>> for CredentialBundle {
    fn from(map: BTreeMap<RoleKey, Secret>) -> Self {
        let mut bundle = Self::new();
        for (role, value) in map {
            bundle.insert(role, value);
        }
        bundle
    }
}

impl From<CredentialBundle> for BTreeMap<RoleKey, Secret> {
    fn from(bundle: CredentialBundle) -> Self {
        bundle.roles
    }
}
