//! Random credential generation.
//!
//! Credentials come from a [`RandomSource`], which stands for whatever
//! secure random-string service the deployment trusts. The generator checks
//! every response against the [`PasswordPolicy`] and never substitutes a
//! placeholder value: a bad response is a [`GenerationError`].

use async_trait::async_trait;
use rand::Rng;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::store::Secret;

/// Letters and digits; punctuation is excluded so values survive shells,
/// URLs and connection strings unescaped.
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Error produced while generating a credential.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The random source failed to produce a value.
    #[error("random source failed: {message}")]
    Service { message: String },

    /// The random source produced a value that violates the policy.
    #[error("random source returned an unusable value: {reason}")]
    Malformed { reason: String },
}

/// Shape of generated credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Exact number of characters.
    pub length: usize,

    /// Restrict output to ASCII letters and digits.
    pub exclude_punctuation: bool,
}

impl PasswordPolicy {
    /// Check a candidate value against this policy.
    pub fn check(&self, value: &str) -> Result<(), GenerationError> {
        let actual = value.chars().count();
        if actual != self.length {
            return Err(GenerationError::Malformed {
                reason: format!("expected {} characters, got {}", self.length, actual),
            });
        }

        if self.exclude_punctuation && !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GenerationError::Malformed {
                reason: "value contains characters outside [A-Za-z0-9]".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 32,
            exclude_punctuation: true,
        }
    }
}

/// A service that produces random strings on request.
#[async_trait]
pub trait RandomSource: Send + Sync {
    /// Produce one random string honoring `policy`.
    async fn random_string(&self, policy: &PasswordPolicy) -> Result<String, GenerationError>;
}

/// [`RandomSource`] backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

#[async_trait]
impl RandomSource for OsRandomSource {
    async fn random_string(&self, policy: &PasswordPolicy) -> Result<String, GenerationError> {
        const WITH_PUNCTUATION: &[u8] =
            b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-.:;<=>?@[]^_{|}~";

        let charset = if policy.exclude_punctuation {
            ALPHANUMERIC
        } else {
            WITH_PUNCTUATION
        };

        let mut rng = OsRng;
        Ok((0..policy.length)
            .map(|_| charset[rng.gen_range(0..charset.len())] as char)
            .collect())
    }
}

/// Produces policy-conforming credentials from a [`RandomSource`].
#[derive(Debug, Clone, Default)]
pub struct CredentialGenerator<R = OsRandomSource> {
    source: R,
    policy: PasswordPolicy,
}

impl<R: RandomSource> CredentialGenerator<R> {
    /// Create a generator with the default 32-character alphanumeric policy.
    pub fn new(source: R) -> Self {
        Self::with_policy(source, PasswordPolicy::default())
    }

    /// Create a generator with an explicit policy.
    pub fn with_policy(source: R, policy: PasswordPolicy) -> Self {
        Self { source, policy }
    }

    /// The policy every generated value satisfies.
    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Generate one credential.
    pub async fn generate(&self) -> Result<Secret, GenerationError> {
        let value = self.source.random_string(&self.policy).await?;
        self.policy.check(&value)?;
        Ok(Secret::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper source that always returns the same string.
    struct FixedSource(&'static str);

    #[async_trait]
    impl RandomSource for FixedSource {
        async fn random_string(&self, _: &PasswordPolicy) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RandomSource for FailingSource {
        async fn random_string(&self, _: &PasswordPolicy) -> Result<String, GenerationError> {
            Err(GenerationError::Service {
                message: "throttled".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_os_source_default_policy() {
        let generator = CredentialGenerator::new(OsRandomSource);

        let a = generator.generate().await.unwrap();
        let b = generator.generate().await.unwrap();

        assert_eq!(a.expose().len(), 32);
        assert!(a.expose().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_custom_length() {
        let policy = PasswordPolicy {
            length: 12,
            exclude_punctuation: true,
        };
        let generator = CredentialGenerator::with_policy(OsRandomSource, policy);

        assert_eq!(generator.generate().await.unwrap().expose().len(), 12);
    }

    #[tokio::test]
    async fn test_service_failure_is_an_error() {
        let generator = CredentialGenerator::new(FailingSource);
        let result = generator.generate().await;
        assert!(matches!(result, Err(GenerationError::Service { .. })));
    }

    #[tokio::test]
    async fn test_wrong_length_is_rejected() {
        let generator = CredentialGenerator::new(FixedSource("short"));
        let result = generator.generate().await;
        assert!(matches!(result, Err(GenerationError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_punctuation_is_rejected() {
        let generator = CredentialGenerator::new(FixedSource("abcdefghijklmnopqrstuvwxyz01234!"));
        let result = generator.generate().await;
        assert!(matches!(result, Err(GenerationError::Malformed { .. })));
    }
}
