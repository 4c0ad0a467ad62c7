//! Top-level error type for keyturn operations.

use thiserror::Error;

use crate::generator::GenerationError;
use crate::model::RoleKey;
use crate::poller::ConvergenceError;
use crate::store::StoreError;
use crate::target::TargetError;

/// Error returned by bundle issuance and association runs.
///
/// Failures at a target carry the target's description so the caller can
/// tell which step of a fan-out stopped the run.
#[derive(Debug, Error)]
pub enum RotationError {
    /// Error from secret storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error generating a credential.
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// A convergence spec failed validation before any target was touched.
    #[error("convergence error: {0}")]
    Spec(#[from] ConvergenceError),

    /// The bundle has no value for the role a target needs.
    #[error("secret {secret_id} has no value for role {role}")]
    MissingCredential { secret_id: String, role: RoleKey },

    /// A target's control plane refused or failed the mutation.
    #[error("failed to update {target}: {source}")]
    TargetMutation {
        target: String,
        #[source]
        source: TargetError,
    },

    /// A target accepted the mutation but did not converge.
    #[error("{target} did not converge: {source}")]
    Convergence {
        target: String,
        #[source]
        source: ConvergenceError,
    },
}
