//! Turns placements into router scaling and broker cluster creation.

use std::collections::{BTreeMap, BTreeSet};

use msgplane_events::{Event, EventLogger, EventReason, ObjectKind};
use msgplane_model::{
    Address, AddressKey, BrokerCluster, Phase, PlanSet, ResourceKind, RouterCluster,
};
use tracing::{debug, info, instrument, warn};

use crate::scheduler::apply_outcome;
use crate::{
    AddressOutcome, BrokerClusterKind, BrokerClusterSpec, InfraClient, InfraError,
    InfrastructureChanges, ProvisionResult, UsageBucket, UsageMap, ALL_INSTANCES,
};

/// Issues the infrastructure requests implied by a usage map.
pub struct Materializer<'a> {
    infra: &'a dyn InfraClient,
    events: &'a dyn EventLogger,
    plans: &'a PlanSet,
    min_router_replicas: u32,
}

impl<'a> Materializer<'a> {
    pub fn new(
        infra: &'a dyn InfraClient,
        events: &'a dyn EventLogger,
        plans: &'a PlanSet,
        min_router_replicas: u32,
    ) -> Self {
        Self {
            infra,
            events,
            plans,
            min_router_replicas,
        }
    }

    /// Scale the router and create every missing broker cluster.
    ///
    /// A failed creation marks the Configuring addresses of that cluster
    /// Failed and the pass carries on. Only a router scaling error other
    /// than `NotFound` is returned.
    #[instrument(skip_all, fields(router = %router.name, brokers = brokers.len()))]
    pub fn materialize(
        &self,
        router: &RouterCluster,
        brokers: &[BrokerCluster],
        usage: &UsageMap,
        addresses: &mut [Address],
        outcomes: &mut BTreeMap<AddressKey, AddressOutcome>,
    ) -> ProvisionResult<InfrastructureChanges> {
        let mut changes = InfrastructureChanges::new(self.scale_router(router, usage)?);
        changes.router_scaled = changes.router.needs_scaling();

        let existing: BTreeSet<&str> = brokers.iter().map(|b| b.cluster_id.as_str()).collect();

        for spec in self.desired_clusters(usage, addresses) {
            if existing.contains(spec.cluster_id.as_str()) {
                continue;
            }

            match self.infra.create_broker_cluster(&spec) {
                Ok(()) => {
                    info!(
                        cluster_id = %spec.cluster_id,
                        replicas = spec.replicas,
                        "Created broker cluster"
                    );
                    self.events.log(Event::normal(
                        EventReason::BrokerCreated,
                        format!("Created broker {} with {} replicas", spec.cluster_id, spec.replicas),
                        ObjectKind::Broker,
                        spec.cluster_id.clone(),
                    ));
                    changes.created.push(spec);
                }
                Err(e) if e.is_conflict() => {
                    debug!(cluster_id = %spec.cluster_id, "Broker cluster already exists");
                }
                Err(e) => {
                    self.fail_cluster(&spec.cluster_id, &e, addresses, outcomes);
                    changes.failed.push(spec.cluster_id);
                }
            }
        }

        Ok(changes)
    }

    /// Returns the router snapshot annotated with its desired size.
    fn scale_router(&self, router: &RouterCluster, usage: &UsageMap) -> ProvisionResult<RouterCluster> {
        let needed = usage
            .get(UsageBucket::Router, ALL_INSTANCES)
            .map_or(0, |info| info.needed());
        let desired = needed.max(self.min_router_replicas);

        let mut snapshot = router.clone();
        snapshot.new_replicas = Some(desired);
        if desired == router.replicas {
            return Ok(snapshot);
        }

        match self.infra.scale_router(&router.name, desired) {
            Ok(()) => {
                info!(from = router.replicas, to = desired, "Scaled router");
            }
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "Router not found, skipping scale");
                snapshot.new_replicas = None;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(snapshot)
    }

    /// Broker clusters backing the bound addresses, in cluster id order.
    fn desired_clusters(&self, usage: &UsageMap, addresses: &[Address]) -> Vec<BrokerClusterSpec> {
        let mut desired: BTreeMap<String, BrokerClusterSpec> = BTreeMap::new();

        for address in addresses {
            if !address.phase().is_bound() || address.address_type.is_subscription() {
                continue;
            }
            let Ok(plan) = self.plans.plan_for(address) else {
                continue;
            };
            let Some(request) = plan.broker_request() else {
                continue;
            };
            let Some(cluster_id) = address.cluster_id() else {
                continue;
            };
            let needed = usage
                .get(UsageBucket::Broker, cluster_id)
                .map_or(0, |info| info.needed());
            if needed == 0 || desired.contains_key(cluster_id) {
                continue;
            }

            let spec = if request.is_pooled() {
                self.cluster_spec(cluster_id, BrokerClusterKind::Pooled, 1, None)
            } else {
                self.cluster_spec(cluster_id, BrokerClusterKind::Sharded, needed, Some(address))
            };
            desired.insert(cluster_id.to_string(), spec);
        }

        desired.into_values().collect()
    }

    fn cluster_spec(
        &self,
        cluster_id: &str,
        kind: BrokerClusterKind,
        replicas: u32,
        owner: Option<&Address>,
    ) -> BrokerClusterSpec {
        let definition = self.plans.resource_definition(ResourceKind::Broker);
        let mut parameters = definition
            .map(|d| d.parameters.clone())
            .unwrap_or_default();
        parameters.insert("CLUSTER_ID".to_string(), cluster_id.to_string());
        if let Some(address) = owner {
            parameters.insert("ADDRESS".to_string(), address.address.clone());
            parameters.insert("ADDRESS_SPACE".to_string(), address.address_space.clone());
            parameters.insert("ADDRESS_PLAN".to_string(), address.plan.clone());
        }

        BrokerClusterSpec {
            cluster_id: cluster_id.to_string(),
            kind,
            replicas,
            template: definition.map(|d| d.template.clone()),
            parameters,
        }
    }

    fn fail_cluster(
        &self,
        cluster_id: &str,
        error: &InfraError,
        addresses: &mut [Address],
        outcomes: &mut BTreeMap<AddressKey, AddressOutcome>,
    ) {
        warn!(cluster_id, error = %error, "Failed to create broker cluster");
        self.events.log(Event::warning(
            EventReason::BrokerCreateFailed,
            format!("Error creating broker {}: {}", cluster_id, error),
            ObjectKind::Broker,
            cluster_id,
        ));

        let outcome = AddressOutcome::Failed {
            reason: format!("Error creating broker: {}", error),
        };
        for address in addresses.iter_mut() {
            if address.phase() == Phase::Configuring && address.cluster_id() == Some(cluster_id) {
                apply_outcome(address, &outcome, None);
                outcomes.insert(address.key(), outcome.clone());
            }
        }
    }
}
