//! One reconciliation pass over the address space.
//!
//! A pass:
//! - Lists addresses and the infrastructure inventory
//! - Runs the provisioner (schedule pending addresses, create brokers)
//! - Deletes broker clusters no bound address references any more
//! - Verifies router status of bound addresses
//! - Writes back every address that changed

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use msgplane_events::{Event, EventLogger, EventReason, ObjectKind};
use msgplane_model::{Address, AddressKey, BrokerCluster, PlanSet};
use msgplane_provision::{AddressOutcome, InfraClient, Provisioner};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::api::{AddressApi, ClusterApi, RouterProbe};
use crate::config::ControllerConfig;
use crate::status::{StatusChecker, StatusReport};

/// Statistics from one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub addresses: usize,
    pub bound: usize,
    pub quota_exceeded: usize,
    pub infeasible: usize,
    pub failed: usize,
    pub brokers_created: usize,
    pub brokers_deleted: usize,
    pub delete_failures: usize,
    pub sync_failures: usize,
    pub status: StatusReport,
}

impl PassStats {
    fn count_outcomes<'a>(&mut self, outcomes: impl IntoIterator<Item = &'a AddressOutcome>) {
        for outcome in outcomes {
            match outcome {
                AddressOutcome::Bound => self.bound += 1,
                AddressOutcome::QuotaExceeded { .. } => self.quota_exceeded += 1,
                AddressOutcome::Infeasible { .. } => self.infeasible += 1,
                AddressOutcome::Failed { .. } => self.failed += 1,
            }
        }
    }
}

/// Collaborators of the controller.
pub struct ControllerDeps {
    pub addresses: Arc<dyn AddressApi>,
    pub clusters: Arc<dyn ClusterApi>,
    pub routers: Arc<dyn RouterProbe>,
    pub infra: Arc<dyn InfraClient>,
    pub events: Arc<dyn EventLogger>,
}

/// Drives provisioning and status for one address space.
pub struct AddressController {
    config: ControllerConfig,
    plans: RwLock<Arc<PlanSet>>,
    addresses: Arc<dyn AddressApi>,
    clusters: Arc<dyn ClusterApi>,
    events: Arc<dyn EventLogger>,
    provisioner: Provisioner,
    status: StatusChecker,
}

impl AddressController {
    pub fn new(config: ControllerConfig, plans: PlanSet, deps: ControllerDeps) -> Self {
        let provisioner = Provisioner::new(config.infra(), deps.infra, Arc::clone(&deps.events));
        let status = StatusChecker::new(
            deps.routers,
            Arc::clone(&deps.clusters),
            Arc::clone(&deps.events),
            config.management_query_timeout,
        );
        Self {
            config,
            plans: RwLock::new(Arc::new(plans)),
            addresses: deps.addresses,
            clusters: deps.clusters,
            events: deps.events,
            provisioner,
            status,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Swap in a new plan snapshot for subsequent passes.
    pub async fn set_plans(&self, plans: PlanSet) {
        let mut current = self.plans.write().await;
        if current.version != plans.version {
            info!(from = current.version, to = plans.version, "Plan set updated");
        }
        *current = Arc::new(plans);
    }

    pub async fn plans(&self) -> Arc<PlanSet> {
        Arc::clone(&*self.plans.read().await)
    }

    /// Run a full provisioning pass.
    ///
    /// A pass that fails as a whole is reported as an `AddressSyncFailed`
    /// event on the address space before the error is returned.
    #[instrument(skip(self), fields(address_space = %self.config.address_space))]
    pub async fn reconcile_once(&self) -> Result<PassStats> {
        let result = self.run_pass().await;
        if let Err(e) = &result {
            warn!(error = %e, "Error synchronizing addresses");
            self.events.log(Event::warning(
                EventReason::AddressSyncFailed,
                format!("Error synchronizing addresses: {:#}", e),
                ObjectKind::AddressSpace,
                self.config.address_space.clone(),
            ));
        }
        result
    }

    async fn run_pass(&self) -> Result<PassStats> {
        let original = self.list_addresses().await?;
        let brokers = self.clusters.list_broker_clusters().await?;
        let router = self.clusters.router_cluster().await?;
        let plans = self.plans().await;

        let provisioned = self
            .provisioner
            .provision(&plans, &original, &router, &brokers)?;

        let mut stats = PassStats {
            addresses: original.len(),
            brokers_created: provisioned.changes.created.len(),
            ..Default::default()
        };
        stats.count_outcomes(provisioned.outcomes.values());

        let desired = provisioned.desired_cluster_ids();
        self.delete_unreferenced(&brokers, |id| desired.contains(id), &mut stats)
            .await;

        let mut addresses = provisioned.addresses;
        stats.status = self.status.check(&mut addresses).await;
        stats.sync_failures = self.persist(&original, &addresses).await;

        info!(
            addresses = stats.addresses,
            bound = stats.bound,
            quota_exceeded = stats.quota_exceeded,
            failed = stats.failed,
            brokers_created = stats.brokers_created,
            brokers_deleted = stats.brokers_deleted,
            activated = stats.status.activated,
            "Reconciliation pass complete"
        );
        Ok(stats)
    }

    /// Verify router status of bound addresses without provisioning.
    #[instrument(skip(self), fields(address_space = %self.config.address_space))]
    pub async fn check_status_once(&self) -> Result<StatusReport> {
        let original = self.list_addresses().await?;
        let mut addresses = original.clone();

        let report = self.status.check(&mut addresses).await;
        self.persist(&original, &addresses).await;

        debug!(
            checked = report.checked,
            activated = report.activated,
            not_ready = report.not_ready,
            failed_routers = report.failed_routers,
            "Status check complete"
        );
        Ok(report)
    }

    async fn list_addresses(&self) -> Result<Vec<Address>> {
        self.addresses
            .list_addresses(
                &self.config.address_space_namespace,
                &self.config.address_space,
            )
            .await
    }

    async fn delete_unreferenced(
        &self,
        brokers: &[BrokerCluster],
        referenced: impl Fn(&str) -> bool,
        stats: &mut PassStats,
    ) {
        for broker in brokers {
            if referenced(&broker.cluster_id) {
                continue;
            }
            match self.clusters.delete_broker_cluster(&broker.cluster_id).await {
                Ok(()) => {
                    info!(cluster_id = %broker.cluster_id, "Deleted unreferenced broker cluster");
                    stats.brokers_deleted += 1;
                    self.events.log(Event::normal(
                        EventReason::BrokerDeleted,
                        format!("Deleted broker {}", broker.cluster_id),
                        ObjectKind::Broker,
                        broker.cluster_id.clone(),
                    ));
                }
                Err(e) => {
                    warn!(cluster_id = %broker.cluster_id, error = %e, "Failed to delete broker cluster");
                    stats.delete_failures += 1;
                    self.events.log(Event::warning(
                        EventReason::BrokerDeleteFailed,
                        format!("Error deleting broker {}: {}", broker.cluster_id, e),
                        ObjectKind::Broker,
                        broker.cluster_id.clone(),
                    ));
                }
            }
        }
    }

    /// Write back addresses that differ from what was read. Returns the
    /// number of failed writes.
    async fn persist(&self, original: &[Address], updated: &[Address]) -> usize {
        let before: BTreeMap<AddressKey, &Address> =
            original.iter().map(|a| (a.key(), a)).collect();
        let mut failures = 0;

        for address in updated {
            if before.get(&address.key()) == Some(&address) {
                continue;
            }
            if let Err(e) = self.addresses.replace_address(address).await {
                warn!(address = %address.name, error = %e, "Failed to persist address");
                failures += 1;
                self.events.log(Event::warning(
                    EventReason::AddressSyncFailed,
                    format!("Error syncing address {}: {}", address.name, e),
                    ObjectKind::Address,
                    address.name.clone(),
                ));
            }
        }

        failures
    }
}
