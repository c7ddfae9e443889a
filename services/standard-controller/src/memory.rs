//! In-memory backend for development and testing.
//!
//! Implements the address store, infrastructure inventory, router probe and
//! infrastructure client over one shared state. Live routers behave like a
//! router agent that applies configuration instantly: they carry every bound
//! address. A broker cluster is ready once it exists, unless marked down.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use msgplane_model::{Address, AddressKey, AddressType, BrokerCluster, RouterCluster};
use msgplane_provision::{BrokerClusterSpec, InfraClient, InfraError};
use tracing::debug;

use crate::api::{AddressApi, ClusterApi, RouterConfig, RouterProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterMode {
    Live,
    Failing,
}

#[derive(Debug)]
struct State {
    addresses: BTreeMap<AddressKey, Address>,
    brokers: BTreeMap<String, BrokerCluster>,
    router: RouterCluster,
    routers: BTreeMap<String, RouterMode>,
    failing_brokers: BTreeSet<String>,
    failing_replaces: BTreeSet<AddressKey>,
    down_brokers: BTreeSet<String>,
}

/// Shared in-memory state behind every controller interface.
#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    /// Create a backend with a router deployment of `replicas` live routers.
    pub fn new(router: impl Into<String>, replicas: u32) -> Self {
        let router = RouterCluster::new(router, replicas);
        let routers = (0..replicas)
            .map(|i| (format!("{}-{}", router.name, i), RouterMode::Live))
            .collect();
        Self {
            state: Mutex::new(State {
                addresses: BTreeMap::new(),
                brokers: BTreeMap::new(),
                router,
                routers,
                failing_brokers: BTreeSet::new(),
                failing_replaces: BTreeSet::new(),
                down_brokers: BTreeSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite an address.
    pub fn put_address(&self, address: Address) {
        self.state().addresses.insert(address.key(), address);
    }

    pub fn address(&self, namespace: &str, name: &str) -> Option<Address> {
        let key = AddressKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.state().addresses.get(&key).cloned()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.state().addresses.values().cloned().collect()
    }

    /// Insert a broker cluster as if it had been created earlier.
    pub fn put_broker(&self, broker: BrokerCluster) {
        self.state()
            .brokers
            .insert(broker.cluster_id.clone(), broker);
    }

    pub fn broker_ids(&self) -> Vec<String> {
        self.state().brokers.keys().cloned().collect()
    }

    pub fn router(&self) -> RouterCluster {
        self.state().router.clone()
    }

    /// Make creation and deletion of a broker cluster fail.
    pub fn fail_broker(&self, cluster_id: &str) {
        self.state().failing_brokers.insert(cluster_id.to_string());
    }

    /// Mark an existing broker cluster as down or back up.
    pub fn set_broker_ready(&self, cluster_id: &str, ready: bool) {
        let mut state = self.state();
        if ready {
            state.down_brokers.remove(cluster_id);
        } else {
            state.down_brokers.insert(cluster_id.to_string());
        }
    }

    /// Make management queries to a router fail.
    pub fn fail_router(&self, router: &str) {
        self.state()
            .routers
            .insert(router.to_string(), RouterMode::Failing);
    }

    /// Make replacing an address fail.
    pub fn fail_replace(&self, key: AddressKey) {
        self.state().failing_replaces.insert(key);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_brokers.clear();
        state.failing_replaces.clear();
        state.down_brokers.clear();
        for mode in state.routers.values_mut() {
            *mode = RouterMode::Live;
        }
    }
}

impl State {
    fn router_config(&self) -> RouterConfig {
        let mut config = RouterConfig::default();
        for address in self.addresses.values() {
            if !address.phase().is_bound() {
                continue;
            }
            let name = address.address.clone();
            match address.address_type {
                AddressType::Topic => {
                    config.link_routes.insert(name);
                }
                AddressType::Queue => {
                    config.addresses.insert(name.clone());
                    config.auto_links.insert(name);
                }
                AddressType::Anycast | AddressType::Multicast | AddressType::Subscription => {
                    config.addresses.insert(name);
                }
            }
        }
        config
    }
}

#[async_trait]
impl AddressApi for InMemoryBackend {
    async fn list_addresses(&self, namespace: &str, address_space: &str) -> Result<Vec<Address>> {
        Ok(self
            .state()
            .addresses
            .values()
            .filter(|a| a.namespace == namespace && a.address_space == address_space)
            .cloned()
            .collect())
    }

    async fn replace_address(&self, address: &Address) -> Result<()> {
        let key = address.key();
        let mut state = self.state();
        if state.failing_replaces.contains(&key) {
            return Err(anyhow!("conflict replacing {}", key));
        }
        if !state.addresses.contains_key(&key) {
            return Err(anyhow!("address {} not found", key));
        }
        state.addresses.insert(key, address.clone());
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for InMemoryBackend {
    async fn list_broker_clusters(&self) -> Result<Vec<BrokerCluster>> {
        Ok(self.state().brokers.values().cloned().collect())
    }

    async fn router_cluster(&self) -> Result<RouterCluster> {
        Ok(self.router())
    }

    async fn delete_broker_cluster(&self, cluster_id: &str) -> Result<()> {
        let mut state = self.state();
        if state.failing_brokers.contains(cluster_id) {
            return Err(anyhow!("failed to delete broker cluster {}", cluster_id));
        }
        state.brokers.remove(cluster_id);
        state.down_brokers.remove(cluster_id);
        debug!(cluster_id, "Deleted broker cluster");
        Ok(())
    }

    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool> {
        let state = self.state();
        Ok(state.brokers.contains_key(cluster_id) && !state.down_brokers.contains(cluster_id))
    }
}

#[async_trait]
impl RouterProbe for InMemoryBackend {
    async fn list_routers(&self) -> Result<Vec<String>> {
        Ok(self.state().routers.keys().cloned().collect())
    }

    async fn query(&self, router: &str) -> Result<RouterConfig> {
        let state = self.state();
        match state.routers.get(router) {
            Some(RouterMode::Live) => Ok(state.router_config()),
            Some(RouterMode::Failing) => Err(anyhow!("router {} is not responding", router)),
            None => Err(anyhow!("router {} not found", router)),
        }
    }
}

impl InfraClient for InMemoryBackend {
    fn create_broker_cluster(&self, spec: &BrokerClusterSpec) -> Result<(), InfraError> {
        let mut state = self.state();
        if state.failing_brokers.contains(&spec.cluster_id) {
            return Err(InfraError::Internal(format!(
                "quota exhausted creating {}",
                spec.cluster_id
            )));
        }
        if state.brokers.contains_key(&spec.cluster_id) {
            return Err(InfraError::Conflict(spec.cluster_id.clone()));
        }
        state.brokers.insert(
            spec.cluster_id.clone(),
            BrokerCluster::new(spec.cluster_id.clone(), spec.replicas),
        );
        Ok(())
    }

    fn scale_router(&self, name: &str, replicas: u32) -> Result<(), InfraError> {
        let mut state = self.state();
        if state.router.name != name {
            return Err(InfraError::NotFound(name.to_string()));
        }
        let current = state.router.replicas;
        for i in current..replicas {
            let router = format!("{}-{}", name, i);
            state.routers.insert(router, RouterMode::Live);
        }
        for i in replicas..current {
            state.routers.remove(&format!("{}-{}", name, i));
        }
        state.router.replicas = replicas;
        Ok(())
    }
}
