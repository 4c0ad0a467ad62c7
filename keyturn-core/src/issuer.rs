//! Bundle issuance.

use tracing::info;

use crate::bundle::CredentialBundle;
use crate::error::RotationError;
use crate::generator::{CredentialGenerator, OsRandomSource, RandomSource};
use crate::identity::OpaqueIdentifier;
use crate::model::{GenerationProfile, SecretId};
use crate::store::{BundleStore, SecretStore};

/// Creates credential bundles.
///
/// Every role of the requested profile is generated before anything is
/// written, so a bundle is either stored complete or not at all.
pub struct BundleIssuer<S, R = OsRandomSource> {
    store: BundleStore<S>,
    generator: CredentialGenerator<R>,
}

impl<S: SecretStore, R: RandomSource> BundleIssuer<S, R> {
    pub fn new(store: BundleStore<S>, generator: CredentialGenerator<R>) -> Self {
        Self { store, generator }
    }

    /// Access the underlying bundle store.
    pub fn store(&self) -> &BundleStore<S> {
        &self.store
    }

    /// Generate a fresh bundle for `profile` and store it under `secret_id`.
    ///
    /// Replaces any existing bundle. Returns the secret id as the
    /// identifier.
    pub async fn issue(
        &self,
        secret_id: &SecretId,
        profile: &GenerationProfile,
    ) -> Result<OpaqueIdentifier, RotationError> {
        let mut bundle = CredentialBundle::new();
        for role in profile.roles() {
            bundle.insert(role, self.generator.generate().await?);
        }

        self.store.put(secret_id, &bundle).await?;
        info!("Issued bundle {} with {} roles", secret_id, bundle.len());

        Ok(OpaqueIdentifier::from_components([secret_id.as_str()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerationError, PasswordPolicy};
    use crate::model::RoleKey;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Helper source that fails after a number of successful draws.
    struct FlakySource {
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl RandomSource for FlakySource {
        async fn random_string(&self, policy: &PasswordPolicy) -> Result<String, GenerationError> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(GenerationError::Service {
                    message: "rate limited".to_string(),
                });
            }
            Ok("x".repeat(policy.length))
        }
    }

    #[tokio::test]
    async fn test_issue_database_profile() {
        let issuer = BundleIssuer::new(
            BundleStore::new(MemoryStore::new()),
            CredentialGenerator::new(OsRandomSource),
        );
        let id = SecretId::new("prod/orders");

        let issued = issuer.issue(&id, &GenerationProfile::Database).await.unwrap();
        assert_eq!(issued.as_str(), "prod/orders");

        let bundle = issuer.store().get(&id).await.unwrap();
        assert_eq!(bundle.len(), 3);
        assert!(bundle.get(&RoleKey::AUTH_TOKEN).is_none());
        let admin = bundle.get(&RoleKey::ADMIN_PASSWORD).unwrap();
        let user = bundle.get(&RoleKey::USER_PASSWORD).unwrap();
        assert_eq!(admin.expose().len(), 32);
        assert_ne!(admin, user);
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let issuer = BundleIssuer::new(
            BundleStore::new(MemoryStore::new()),
            CredentialGenerator::new(FlakySource {
                remaining: AtomicUsize::new(1),
            }),
        );
        let id = SecretId::new("prod/broker");

        let result = issuer.issue(&id, &GenerationProfile::Broker).await;

        assert!(matches!(result, Err(RotationError::Generation(_))));
        assert!(matches!(
            issuer.store().get(&id).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
