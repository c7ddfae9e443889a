//! Snapshot of existing broker and router infrastructure.

use serde::{Deserialize, Serialize};

/// An existing broker cluster (one stateful set of broker replicas).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerCluster {
    pub cluster_id: String,
    pub replicas: u32,
    /// Desired replica count, when a change has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_replicas: Option<u32>,
}

impl BrokerCluster {
    pub fn new(cluster_id: impl Into<String>, replicas: u32) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            replicas,
            new_replicas: None,
        }
    }
}

/// The router deployment of an address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterCluster {
    pub name: String,
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_replicas: Option<u32>,
}

impl RouterCluster {
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
            new_replicas: None,
        }
    }

    /// Returns true if the desired replica count differs from the current one.
    pub fn needs_scaling(&self) -> bool {
        self.new_replicas.is_some_and(|n| n != self.replicas)
    }
}
