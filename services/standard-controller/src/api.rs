//! Interfaces to the address store, the infrastructure inventory and the
//! routers.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use msgplane_model::{Address, BrokerCluster, RouterCluster};
use serde::{Deserialize, Serialize};

/// Address store of one address space.
#[async_trait]
pub trait AddressApi: Send + Sync {
    /// List every address of the address space.
    async fn list_addresses(&self, namespace: &str, address_space: &str) -> Result<Vec<Address>>;

    /// Replace the stored address with this one.
    async fn replace_address(&self, address: &Address) -> Result<()>;
}

/// Infrastructure inventory of one address space.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List the existing broker clusters.
    async fn list_broker_clusters(&self) -> Result<Vec<BrokerCluster>>;

    /// Fetch the router deployment.
    async fn router_cluster(&self) -> Result<RouterCluster>;

    /// Delete a broker cluster.
    async fn delete_broker_cluster(&self, cluster_id: &str) -> Result<()>;

    /// Whether every broker of a cluster is up.
    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool>;
}

/// Management access to the routers.
#[async_trait]
pub trait RouterProbe: Send + Sync {
    /// Names of the running routers.
    async fn list_routers(&self) -> Result<Vec<String>>;

    /// Query the configuration of one router.
    async fn query(&self, router: &str) -> Result<RouterConfig>;
}

/// Addresses, auto-links and link routes configured on a router, each
/// identified by the address string it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub addresses: BTreeSet<String>,
    pub auto_links: BTreeSet<String>,
    pub link_routes: BTreeSet<String>,
}
