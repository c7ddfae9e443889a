//! Infrastructure client interface and the change record of a pass.

use std::collections::BTreeMap;

use msgplane_model::RouterCluster;
use thiserror::Error;

/// Errors reported by the infrastructure client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfraError {
    /// The target object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object already exists (or was modified concurrently).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The orchestrator rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The orchestrator did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Any other failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InfraError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Whether a broker cluster is shared or dedicated to one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerClusterKind {
    Pooled,
    Sharded,
}

/// Everything the orchestrator client needs to render a broker cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerClusterSpec {
    pub cluster_id: String,
    pub kind: BrokerClusterKind,
    pub replicas: u32,
    /// Template name from the broker resource definition, if any.
    pub template: Option<String>,
    /// Template parameters (definition parameters plus address details).
    pub parameters: BTreeMap<String, String>,
}

/// Synchronous orchestrator client.
///
/// Calls must be idempotent: creating a cluster that already exists reports
/// [`InfraError::Conflict`], scaling to the current size succeeds.
pub trait InfraClient: Send + Sync {
    fn create_broker_cluster(&self, spec: &BrokerClusterSpec) -> Result<(), InfraError>;

    fn scale_router(&self, name: &str, replicas: u32) -> Result<(), InfraError>;
}

/// Infrastructure changes issued by one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfrastructureChanges {
    /// Router snapshot annotated with its desired replica count.
    pub router: RouterCluster,
    /// True if a scale request was sent for the router.
    pub router_scaled: bool,
    /// Broker clusters created in this pass.
    pub created: Vec<BrokerClusterSpec>,
    /// Cluster ids whose creation failed.
    pub failed: Vec<String>,
}

impl InfrastructureChanges {
    pub fn new(router: RouterCluster) -> Self {
        Self {
            router,
            router_scaled: false,
            created: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true if the pass requested nothing from the orchestrator.
    pub fn is_empty(&self) -> bool {
        !self.router_scaled && self.created.is_empty() && self.failed.is_empty()
    }
}
