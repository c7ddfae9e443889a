//! A full provisioning pass over one address space.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use msgplane_events::EventLogger;
use msgplane_model::{Address, AddressKey, BrokerCluster, PlanSet, RouterCluster};
use msgplane_naming::InfraUuid;
use tracing::{info, instrument};

use crate::{
    compute_usage, AddressOutcome, InfraClient, InfrastructureChanges, Materializer,
    ProvisionResult, Scheduler, UsageMap,
};

/// Address space infrastructure settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    /// Suffix shared by every infrastructure object of the address space.
    pub infra_uuid: InfraUuid,
    /// The router is never scaled below this.
    pub min_router_replicas: u32,
}

/// Everything a pass decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    /// Updated copies of the input addresses, in input order.
    pub addresses: Vec<Address>,
    pub usage: UsageMap,
    /// Outcome of every address the pass attempted.
    pub outcomes: BTreeMap<AddressKey, AddressOutcome>,
    pub changes: InfrastructureChanges,
}

impl Provisioned {
    /// Broker clusters still referenced by a bound address.
    pub fn desired_cluster_ids(&self) -> BTreeSet<String> {
        self.addresses
            .iter()
            .filter(|a| a.phase().is_bound())
            .filter_map(|a| a.cluster_id())
            .map(str::to_string)
            .collect()
    }
}

/// Runs accounting, scheduling and materialization in order.
pub struct Provisioner {
    config: InfraConfig,
    infra: Arc<dyn InfraClient>,
    events: Arc<dyn EventLogger>,
}

impl Provisioner {
    pub fn new(
        config: InfraConfig,
        infra: Arc<dyn InfraClient>,
        events: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            config,
            infra,
            events,
        }
    }

    pub fn config(&self) -> &InfraConfig {
        &self.config
    }

    /// Place pending addresses and create what they need.
    ///
    /// The input is never modified; updated addresses come back in
    /// [`Provisioned::addresses`]. Pending and Failed addresses are
    /// scheduled, Configuring and Active ones make up the usage baseline.
    #[instrument(skip_all, fields(infra_uuid = %self.config.infra_uuid, addresses = addresses.len()))]
    pub fn provision(
        &self,
        plans: &PlanSet,
        addresses: &[Address],
        router: &RouterCluster,
        brokers: &[BrokerCluster],
    ) -> ProvisionResult<Provisioned> {
        let mut working = addresses.to_vec();

        let usage = compute_usage(working.iter().filter(|a| a.phase().is_bound()), plans)?;
        let pending: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.phase().is_bound())
            .map(|(i, _)| i)
            .collect();

        let report =
            Scheduler::new(plans, &self.config.infra_uuid).schedule(usage, &mut working, &pending);
        let mut outcomes = report.outcomes;

        let changes = Materializer::new(
            self.infra.as_ref(),
            self.events.as_ref(),
            plans,
            self.config.min_router_replicas,
        )
        .materialize(router, brokers, &report.usage, &mut working, &mut outcomes)?;

        let bound = outcomes.values().filter(|o| o.is_bound()).count();
        info!(
            pending = pending.len(),
            bound,
            created = changes.created.len(),
            failed = changes.failed.len(),
            "Provisioning pass complete"
        );

        Ok(Provisioned {
            addresses: working,
            usage: report.usage,
            outcomes,
            changes,
        })
    }
}
