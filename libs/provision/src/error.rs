//! Provisioning errors.

use thiserror::Error;

use crate::InfraError;

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that abort a whole provisioning pass.
///
/// Per-address problems (quota, infeasible placement, failed broker
/// creation) never surface here; they are written onto the address status.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Two bound addresses claim the same sharded cluster.
    #[error("cluster id {cluster_id} is claimed by both {first} and {second}")]
    ClusterIdConflict {
        cluster_id: String,
        first: String,
        second: String,
    },

    /// The infrastructure client failed in a way the pass cannot absorb.
    #[error("infrastructure error: {0}")]
    Infra(#[from] InfraError),
}
