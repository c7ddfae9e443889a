//! Quota-constrained placement of pending addresses.

use std::collections::{BTreeMap, BTreeSet};

use msgplane_model::{
    annotations, Address, AddressKey, AddressType, Phase, PlanSet, QuotaLimits, ResourceKind,
};
use msgplane_naming::{
    next_pooled_index, pooled_broker_id, pooled_index, shard_broker_id, shard_index,
    sharded_cluster_id, InfraUuid,
};
use tracing::{debug, info, instrument, warn};

use crate::{UsageBucket, UsageMap, ALL_INSTANCES};

/// Status message of an address rejected by the address space quota.
pub const QUOTA_EXCEEDED: &str = "Quota exceeded";

/// Tolerance for float comparisons against capacities and limits.
const EPSILON: f64 = 1e-9;

/// Result of one scheduling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressOutcome {
    /// Placed; the address is now Configuring.
    Bound,
    /// Placement would exceed the allowance of `resource` (or `aggregate`).
    QuotaExceeded { resource: String },
    /// No valid placement exists this pass.
    Infeasible { reason: String },
    /// Placed, but the backing broker could not be created.
    Failed { reason: String },
}

impl AddressOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound)
    }
}

/// What a scheduling run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    /// Baseline usage plus every committed placement.
    pub usage: UsageMap,
    /// Outcome per attempted address.
    pub outcomes: BTreeMap<AddressKey, AddressOutcome>,
}

/// Where the broker request of an address landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    Pooled { broker_id: String },
    Sharded { cluster_id: String },
    Subscription { cluster_id: String, broker_id: String },
}

enum Rejection {
    Quota(String),
    Infeasible(String),
}

/// Mutable state of one scheduling run.
struct Pass {
    usage: UsageMap,
    attempted: BTreeSet<usize>,
    outcomes: BTreeMap<AddressKey, AddressOutcome>,
}

/// Binds pending addresses to broker capacity within the address space quota.
pub struct Scheduler<'a> {
    plans: &'a PlanSet,
    infra_uuid: &'a InfraUuid,
    limits: QuotaLimits,
}

impl<'a> Scheduler<'a> {
    pub fn new(plans: &'a PlanSet, infra_uuid: &'a InfraUuid) -> Self {
        Self {
            plans,
            infra_uuid,
            limits: plans.limits(),
        }
    }

    /// Schedule the addresses at the `pending` indices.
    ///
    /// Subscriptions of already bound topics go first, then pending topics
    /// that subscriptions are waiting on, then everything else. Within each
    /// step addresses are visited in key order.
    #[instrument(skip_all, fields(pending = pending.len(), plan_version = self.plans.version))]
    pub fn schedule(
        &self,
        usage: UsageMap,
        addresses: &mut [Address],
        pending: &[usize],
    ) -> ScheduleReport {
        let mut order: Vec<usize> = pending
            .iter()
            .copied()
            .filter(|&i| i < addresses.len())
            .collect();
        order.sort_by(|&a, &b| addresses[a].key().cmp(&addresses[b].key()));
        order.dedup();
        let pending_set: BTreeSet<usize> = order.iter().copied().collect();

        let (subscriptions, others): (Vec<usize>, Vec<usize>) = order
            .iter()
            .partition(|&&i| addresses[i].address_type.is_subscription());

        let mut pass = Pass {
            usage,
            attempted: BTreeSet::new(),
            outcomes: BTreeMap::new(),
        };

        self.schedule_ready_subscriptions(&mut pass, addresses, &subscriptions);

        loop {
            let waiting_on = subscriptions
                .iter()
                .filter(|&&i| !pass.attempted.contains(&i))
                .filter_map(|&i| find_topic(addresses, &addresses[i]))
                .find(|t| pending_set.contains(t) && !pass.attempted.contains(t));
            let Some(topic) = waiting_on else {
                break;
            };
            debug!(topic = %addresses[topic].name, "Scheduling topic ahead of its subscriptions");
            self.attempt(&mut pass, addresses, topic);
            self.schedule_ready_subscriptions(&mut pass, addresses, &subscriptions);
        }

        for &i in &others {
            if !pass.attempted.contains(&i) {
                self.attempt(&mut pass, addresses, i);
            }
        }

        for &i in &subscriptions {
            if pass.attempted.contains(&i) {
                continue;
            }
            let reason = match (find_topic(addresses, &addresses[i]), &addresses[i].topic) {
                (Some(t), _) => format!("Topic {} is not bound", addresses[t].address),
                (None, Some(topic)) => format!("Topic {} not found", topic),
                (None, None) => "Subscription has no topic".to_string(),
            };
            pass.attempted.insert(i);
            let outcome = AddressOutcome::Infeasible { reason };
            apply_outcome(&mut addresses[i], &outcome, None);
            clear_placement(&mut addresses[i], false);
            pass.outcomes.insert(addresses[i].key(), outcome);
        }

        ScheduleReport {
            usage: pass.usage,
            outcomes: pass.outcomes,
        }
    }

    fn schedule_ready_subscriptions(
        &self,
        pass: &mut Pass,
        addresses: &mut [Address],
        subscriptions: &[usize],
    ) {
        for &i in subscriptions {
            if pass.attempted.contains(&i) {
                continue;
            }
            let topic_bound = find_topic(addresses, &addresses[i])
                .is_some_and(|t| addresses[t].phase().is_bound());
            if topic_bound {
                self.attempt(pass, addresses, i);
            }
        }
    }

    fn attempt(&self, pass: &mut Pass, addresses: &mut [Address], index: usize) {
        pass.attempted.insert(index);

        let (outcome, placement) = match self.try_place(&pass.usage, addresses, index) {
            Ok((usage, placement)) => {
                pass.usage = usage;
                (AddressOutcome::Bound, placement)
            }
            Err(Rejection::Quota(resource)) => (AddressOutcome::QuotaExceeded { resource }, None),
            Err(Rejection::Infeasible(reason)) => (AddressOutcome::Infeasible { reason }, None),
        };

        let address = &mut addresses[index];
        apply_outcome(address, &outcome, placement.as_ref());
        if !outcome.is_bound() {
            let sharded = self.plans.plan_for(address).is_ok_and(|p| p.is_sharded());
            clear_placement(address, sharded);
        }
        pass.outcomes.insert(address.key(), outcome);
    }

    /// Place one address on a copy of the usage map. The copy is returned
    /// only if every request and the aggregate stay within the quota.
    fn try_place(
        &self,
        usage: &UsageMap,
        addresses: &[Address],
        index: usize,
    ) -> Result<(UsageMap, Option<Placement>), Rejection> {
        let address = &addresses[index];
        let plan = self
            .plans
            .plan_for(address)
            .map_err(|e| Rejection::Infeasible(e.to_string()))?;

        let mut candidate = usage.clone();
        let mut placement = None;

        for request in &plan.resources {
            let bucket = match (request.resource, address.address_type) {
                (ResourceKind::Router, _) => {
                    candidate.add(UsageBucket::Router, ALL_INSTANCES, request.credit);
                    UsageBucket::Router
                }
                (ResourceKind::Broker, AddressType::Subscription) => {
                    let (cluster_id, broker_id) =
                        self.place_subscription(&candidate, addresses, address, request.credit)?;
                    candidate.add(UsageBucket::Subscription, &broker_id, request.credit);
                    placement = Some(Placement::Subscription {
                        cluster_id,
                        broker_id,
                    });
                    UsageBucket::Subscription
                }
                (ResourceKind::Broker, _) if request.is_pooled() => {
                    let broker_id = self.place_pooled(&candidate, request.credit)?;
                    candidate.add(UsageBucket::Broker, &broker_id, request.credit);
                    placement = Some(Placement::Pooled { broker_id });
                    UsageBucket::Broker
                }
                (ResourceKind::Broker, _) => {
                    let cluster_id = self.place_sharded(&candidate, address)?;
                    candidate.add(UsageBucket::Broker, &cluster_id, request.credit);
                    placement = Some(Placement::Sharded { cluster_id });
                    UsageBucket::Broker
                }
            };

            let (resource, counted) = bucket.quota();
            let needed = candidate.needed(counted);
            let limit = self.limits.limit(resource);
            if f64::from(needed) > limit + EPSILON {
                debug!(address = %address.name, %resource, needed, limit, "Resource limit exceeded");
                return Err(Rejection::Quota(resource.to_string()));
            }
        }

        let aggregate = candidate.aggregate_needed();
        if f64::from(aggregate) > self.limits.aggregate + EPSILON {
            debug!(
                address = %address.name,
                aggregate,
                limit = self.limits.aggregate,
                "Aggregate limit exceeded"
            );
            return Err(Rejection::Quota("aggregate".to_string()));
        }

        Ok((candidate, placement))
    }

    /// Least-loaded pooled broker that stays below one full instance, or a
    /// new one at the lowest free index.
    fn place_pooled(&self, usage: &UsageMap, credit: f64) -> Result<String, Rejection> {
        let best = usage
            .instances(UsageBucket::Broker)
            .filter_map(|(id, info)| {
                pooled_index(self.infra_uuid, id).map(|n| (info.used(), n, id))
            })
            .filter(|(used, _, _)| used + credit < 1.0 - EPSILON)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        if let Some((_, _, id)) = best {
            return Ok(id.to_string());
        }

        let n = next_pooled_index(
            self.infra_uuid,
            usage.instances(UsageBucket::Broker).map(|(id, _)| id),
        );
        if credit < 1.0 - EPSILON {
            Ok(pooled_broker_id(self.infra_uuid, n))
        } else {
            Err(Rejection::Infeasible(format!(
                "credit {} does not fit a pooled broker",
                credit
            )))
        }
    }

    fn place_sharded(&self, usage: &UsageMap, address: &Address) -> Result<String, Rejection> {
        let cluster_id = sharded_cluster_id(
            address.cluster_id(),
            &address.namespace,
            &address.address_space,
            &address.address,
            self.infra_uuid,
        );
        if usage.contains(UsageBucket::Broker, &cluster_id) {
            return Err(Rejection::Infeasible(format!(
                "Cluster {} is already in use",
                cluster_id
            )));
        }
        Ok(cluster_id)
    }

    /// Broker of the subscription's topic with room for `credit`.
    ///
    /// Returns the topic's cluster id and the chosen broker id.
    fn place_subscription(
        &self,
        usage: &UsageMap,
        addresses: &[Address],
        subscription: &Address,
        credit: f64,
    ) -> Result<(String, String), Rejection> {
        let topic = find_topic(addresses, subscription)
            .map(|t| &addresses[t])
            .ok_or_else(|| {
                Rejection::Infeasible(format!(
                    "Topic {} not found",
                    subscription.topic.as_deref().unwrap_or_default()
                ))
            })?;
        let cluster_id = topic
            .cluster_id()
            .filter(|_| topic.phase().is_bound())
            .ok_or_else(|| Rejection::Infeasible(format!("Topic {} is not bound", topic.address)))?;

        let topic_plan = self
            .plans
            .plan_for(topic)
            .map_err(|e| Rejection::Infeasible(e.to_string()))?;

        if !topic_plan.is_sharded() {
            let broker_id = topic.broker_id().ok_or_else(|| {
                Rejection::Infeasible(format!("Topic {} has no broker", topic.address))
            })?;
            if usage.used(UsageBucket::Subscription, broker_id) + credit > 1.0 + EPSILON {
                return Err(Rejection::Infeasible(format!(
                    "Broker {} of topic {} has no room for subscriptions",
                    broker_id, topic.address
                )));
            }
            return Ok((cluster_id.to_string(), broker_id.to_string()));
        }

        let shards = usage
            .get(UsageBucket::Broker, cluster_id)
            .map_or(0, |info| info.needed());

        let known: Vec<(f64, u32, &str)> = usage
            .instances(UsageBucket::Subscription)
            .filter_map(|(id, info)| {
                shard_index(cluster_id, id)
                    .filter(|&i| i < shards)
                    .map(|i| (info.used(), i, id))
            })
            .collect();

        let best = known
            .iter()
            .filter(|(used, _, _)| used + credit <= 1.0 + EPSILON)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        if let Some((_, _, id)) = best {
            return Ok((cluster_id.to_string(), id.to_string()));
        }

        let taken: BTreeSet<u32> = known.iter().map(|(_, i, _)| *i).collect();
        match (0..shards).find(|i| !taken.contains(i)) {
            Some(i) if credit <= 1.0 + EPSILON => {
                Ok((cluster_id.to_string(), shard_broker_id(cluster_id, i)))
            }
            _ => Err(Rejection::Infeasible(format!(
                "No shard of topic {} has room for subscriptions",
                topic.address
            ))),
        }
    }
}

/// Index of the topic a subscription refers to, matched by address string
/// within the subscription's namespace.
fn find_topic(addresses: &[Address], subscription: &Address) -> Option<usize> {
    let topic = subscription.topic.as_deref()?;
    addresses.iter().position(|a| {
        a.address_type == AddressType::Topic
            && a.namespace == subscription.namespace
            && a.address == topic
    })
}

/// Drop the annotations of a placement the address no longer holds.
///
/// The `cluster-id` of a sharded address names its cluster and is kept.
fn clear_placement(address: &mut Address, sharded: bool) {
    address.remove_annotation(annotations::BROKER_ID);
    if !sharded {
        address.remove_annotation(annotations::CLUSTER_ID);
    }
}

pub(crate) fn apply_outcome(address: &mut Address, outcome: &AddressOutcome, placement: Option<&Placement>) {
    match outcome {
        AddressOutcome::Bound => {
            match placement {
                Some(Placement::Pooled { broker_id }) => {
                    address.set_annotation(annotations::CLUSTER_ID, broker_id.clone());
                    address.set_annotation(annotations::BROKER_ID, broker_id.clone());
                }
                Some(Placement::Sharded { cluster_id }) => {
                    address.set_annotation(annotations::CLUSTER_ID, cluster_id.clone());
                    address.remove_annotation(annotations::BROKER_ID);
                }
                Some(Placement::Subscription {
                    cluster_id,
                    broker_id,
                }) => {
                    address.set_annotation(annotations::CLUSTER_ID, cluster_id.clone());
                    address.set_annotation(annotations::BROKER_ID, broker_id.clone());
                }
                None => {}
            }
            address.status.clear_messages().set_phase(Phase::Configuring);
            info!(
                address = %address.name,
                cluster_id = address.cluster_id().unwrap_or_default(),
                "Scheduled address"
            );
        }
        AddressOutcome::QuotaExceeded { resource } => {
            address
                .status
                .clear_messages()
                .append_message(QUOTA_EXCEEDED)
                .set_phase(Phase::Pending);
            info!(address = %address.name, %resource, "Quota exceeded");
        }
        AddressOutcome::Infeasible { reason } => {
            address
                .status
                .clear_messages()
                .append_message(reason.clone())
                .set_phase(Phase::Pending);
            warn!(address = %address.name, %reason, "Unable to schedule address");
        }
        AddressOutcome::Failed { reason } => {
            address
                .status
                .clear_messages()
                .append_message(reason.clone())
                .set_phase(Phase::Failed)
                .set_ready(false);
            warn!(address = %address.name, %reason, "Address failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgplane_model::{AddressPlan, AddressSpacePlan, ResourceAllowance, ResourceRequest};
    use proptest::prelude::*;
    use rstest::rstest;

    fn infra() -> InfraUuid {
        InfraUuid::parse("abc123").unwrap()
    }

    fn plans(router_max: f64, broker_max: f64, aggregate: Option<f64>) -> PlanSet {
        PlanSet::new(
            1,
            AddressSpacePlan {
                name: "test".to_string(),
                resources: vec![
                    ResourceAllowance {
                        resource: ResourceKind::Router,
                        max: router_max,
                    },
                    ResourceAllowance {
                        resource: ResourceKind::Broker,
                        max: broker_max,
                    },
                ],
                aggregate,
            },
        )
        .with_address_plan(AddressPlan::new(
            "small-queue",
            AddressType::Queue,
            vec![ResourceRequest::new(ResourceKind::Broker, 0.4)],
        ))
        .with_address_plan(AddressPlan::new(
            "medium-queue",
            AddressType::Queue,
            vec![ResourceRequest::new(ResourceKind::Broker, 0.6)],
        ))
        .with_address_plan(AddressPlan::new(
            "large-queue",
            AddressType::Queue,
            vec![ResourceRequest::new(ResourceKind::Broker, 1.4)],
        ))
        .with_address_plan(AddressPlan::new(
            "small-topic",
            AddressType::Topic,
            vec![
                ResourceRequest::new(ResourceKind::Router, 0.1),
                ResourceRequest::new(ResourceKind::Broker, 0.4),
            ],
        ))
        .with_address_plan(AddressPlan::new(
            "large-topic",
            AddressType::Topic,
            vec![ResourceRequest::new(ResourceKind::Broker, 2.0)],
        ))
        .with_address_plan(AddressPlan::new(
            "small-subscription",
            AddressType::Subscription,
            vec![ResourceRequest::new(ResourceKind::Broker, 0.3)],
        ))
        .with_address_plan(AddressPlan::new(
            "standard-anycast",
            AddressType::Anycast,
            vec![ResourceRequest::new(ResourceKind::Router, 0.2)],
        ))
    }

    fn queue(name: &str, plan: &str) -> Address {
        Address::new("ns", "space", name, AddressType::Queue, plan)
    }

    fn all(addresses: &[Address]) -> Vec<usize> {
        (0..addresses.len()).collect()
    }

    #[test]
    fn test_pooled_queues_share_a_broker() {
        let plans = plans(1.0, 2.0, None);
        let infra = infra();
        let mut addresses = vec![queue("q1", "small-queue"), queue("q2", "small-queue")];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        for address in &addresses {
            assert_eq!(address.phase(), Phase::Configuring);
            assert_eq!(address.broker_id(), Some("broker-abc123-0"));
            assert_eq!(address.cluster_id(), Some("broker-abc123-0"));
        }
        assert!((report.usage.used(UsageBucket::Broker, "broker-abc123-0") - 0.8).abs() < 1e-9);
        assert!(report.outcomes.values().all(AddressOutcome::is_bound));
    }

    #[test]
    fn test_third_pooled_queue_opens_second_broker() {
        let plans = plans(1.0, 2.0, None);
        let infra = infra();
        let mut addresses = vec![
            queue("q1", "small-queue"),
            queue("q2", "small-queue"),
            queue("q3", "small-queue"),
            queue("q4", "small-queue"),
        ];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(report.usage.needed(UsageBucket::Broker), 2);
        assert_eq!(addresses[2].broker_id(), Some("broker-abc123-1"));
        // The least loaded broker wins, ties broken by index.
        assert_eq!(addresses[3].broker_id(), Some("broker-abc123-1"));
    }

    #[test]
    fn test_second_broker_over_quota_is_rejected() {
        let plans = plans(1.0, 1.0, None);
        let infra = infra();
        let mut addresses = vec![queue("q1", "medium-queue"), queue("q2", "medium-queue")];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[0].phase(), Phase::Configuring);
        assert_eq!(addresses[1].phase(), Phase::Pending);
        assert_eq!(addresses[1].status.messages, vec![QUOTA_EXCEEDED.to_string()]);
        assert!(addresses[1].broker_id().is_none());
        assert_eq!(
            report.outcomes[&addresses[1].key()],
            AddressOutcome::QuotaExceeded {
                resource: "broker".to_string()
            }
        );
        assert_eq!(report.usage.needed(UsageBucket::Broker), 1);
    }

    #[test]
    fn test_rejected_retry_drops_stale_placement() {
        let plans = plans(1.0, 1.0, None);
        let infra = infra();
        let mut usage = UsageMap::new();
        usage.add(UsageBucket::Broker, "broker-abc123-0", 0.6);
        let mut addresses = vec![queue("q1", "medium-queue")
            .with_annotation(annotations::CLUSTER_ID, "broker-abc123-1")
            .with_annotation(annotations::BROKER_ID, "broker-abc123-1")
            .with_phase(Phase::Failed)];
        let pending = all(&addresses);

        Scheduler::new(&plans, &infra).schedule(usage, &mut addresses, &pending);

        assert_eq!(addresses[0].phase(), Phase::Pending);
        assert_eq!(addresses[0].status.messages, vec![QUOTA_EXCEEDED.to_string()]);
        assert!(addresses[0].cluster_id().is_none());
        assert!(addresses[0].broker_id().is_none());
    }

    #[test]
    fn test_rejected_sharded_queue_keeps_cluster_id() {
        let plans = plans(1.0, 1.0, None);
        let infra = infra();
        let mut addresses =
            vec![queue("big", "large-queue").with_annotation(annotations::CLUSTER_ID, "my-cluster")];
        let pending = all(&addresses);

        Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[0].phase(), Phase::Pending);
        assert_eq!(addresses[0].cluster_id(), Some("my-cluster"));
    }

    #[test]
    fn test_subscription_is_checked_against_broker_allowance() {
        // Plans reloaded with fewer brokers than the topics already use.
        let plans = plans(1.0, 1.0, None);
        let infra = infra();
        let mut usage = UsageMap::new();
        usage.add(UsageBucket::Broker, "broker-abc123-0", 0.4);
        usage.add(UsageBucket::Broker, "broker-abc123-1", 0.4);
        let topic = Address::new("ns", "space", "t1", AddressType::Topic, "small-topic")
            .with_annotation(annotations::CLUSTER_ID, "broker-abc123-0")
            .with_annotation(annotations::BROKER_ID, "broker-abc123-0")
            .with_phase(Phase::Active);
        let mut addresses = vec![
            topic,
            Address::new("ns", "space", "s1", AddressType::Subscription, "small-subscription")
                .with_topic("t1"),
        ];

        let report = Scheduler::new(&plans, &infra).schedule(usage, &mut addresses, &[1]);

        assert_eq!(
            report.outcomes[&addresses[1].key()],
            AddressOutcome::QuotaExceeded {
                resource: "broker".to_string()
            }
        );
        assert_eq!(addresses[1].phase(), Phase::Pending);
        assert!(addresses[1].cluster_id().is_none());
        assert_eq!(report.usage.needed(UsageBucket::Subscription), 0);
    }

    #[test]
    fn test_sharded_queue_gets_checksum_cluster_id() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut addresses = vec![queue("big", "large-queue")];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        let expected = sharded_cluster_id(None, "ns", "space", "big", &infra);
        assert_eq!(addresses[0].cluster_id(), Some(expected.as_str()));
        assert!(addresses[0].broker_id().is_none());
        assert_eq!(report.usage.get(UsageBucket::Broker, &expected).unwrap().needed(), 2);
    }

    #[test]
    fn test_sharded_queue_keeps_existing_cluster_id() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut addresses =
            vec![queue("big", "large-queue").with_annotation(annotations::CLUSTER_ID, "My_Cluster")];
        let pending = all(&addresses);

        Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[0].cluster_id(), Some("my-cluster"));
    }

    #[test]
    fn test_sharded_cluster_conflict_is_infeasible() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut usage = UsageMap::new();
        usage.add(UsageBucket::Broker, "taken", 1.4);
        let mut addresses =
            vec![queue("big", "large-queue").with_annotation(annotations::CLUSTER_ID, "taken")];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(usage.clone(), &mut addresses, &pending);

        assert!(matches!(
            report.outcomes[&addresses[0].key()],
            AddressOutcome::Infeasible { .. }
        ));
        assert_eq!(addresses[0].phase(), Phase::Pending);
        assert_eq!(report.usage, usage);
    }

    #[rstest]
    #[case::within(Some(2.0), Phase::Configuring)]
    #[case::over(Some(1.0), Phase::Pending)]
    fn test_aggregate_limit(#[case] aggregate: Option<f64>, #[case] expected: Phase) {
        let plans = plans(1.0, 4.0, aggregate);
        let infra = infra();
        let mut addresses = vec![queue("big", "large-queue")];
        let pending = all(&addresses);

        Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[0].phase(), expected);
    }

    #[test]
    fn test_missing_allowance_means_no_capacity() {
        let mut plans = plans(1.0, 4.0, None);
        plans
            .address_space_plan
            .resources
            .retain(|r| r.resource != ResourceKind::Router);
        let infra = infra();
        let mut addresses = vec![Address::new(
            "ns",
            "space",
            "any",
            AddressType::Anycast,
            "standard-anycast",
        )];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(
            report.outcomes[&addresses[0].key()],
            AddressOutcome::QuotaExceeded {
                resource: "router".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_plan_is_infeasible() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut addresses = vec![queue("q", "missing")];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert!(matches!(
            report.outcomes[&addresses[0].key()],
            AddressOutcome::Infeasible { .. }
        ));
        assert_eq!(addresses[0].status.messages.len(), 1);
    }

    #[test]
    fn test_subscription_waits_for_topic_in_same_pass() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut addresses = vec![
            Address::new("ns", "space", "s1", AddressType::Subscription, "small-subscription")
                .with_topic("t1"),
            Address::new("ns", "space", "t1", AddressType::Topic, "small-topic"),
        ];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[1].phase(), Phase::Configuring);
        assert_eq!(addresses[0].phase(), Phase::Configuring);
        assert_eq!(addresses[0].broker_id(), addresses[1].broker_id());
        assert_eq!(addresses[0].cluster_id(), addresses[1].cluster_id());
        assert!(report
            .usage
            .contains(UsageBucket::Subscription, "broker-abc123-0"));
    }

    #[test]
    fn test_subscription_of_rejected_topic_stays_pending() {
        let plans = plans(1.0, 0.0, None);
        let infra = infra();
        let mut addresses = vec![
            Address::new("ns", "space", "s1", AddressType::Subscription, "small-subscription")
                .with_topic("t1"),
            Address::new("ns", "space", "t1", AddressType::Topic, "small-topic"),
        ];
        let pending = all(&addresses);

        let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[1].phase(), Phase::Pending);
        assert_eq!(addresses[0].phase(), Phase::Pending);
        assert!(matches!(
            report.outcomes[&addresses[0].key()],
            AddressOutcome::Infeasible { .. }
        ));
        assert_eq!(report.usage.needed(UsageBucket::Subscription), 0);
    }

    #[test]
    fn test_subscription_without_topic_is_infeasible() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let mut addresses = vec![Address::new(
            "ns",
            "space",
            "s1",
            AddressType::Subscription,
            "small-subscription",
        )
        .with_topic("nowhere")];
        let pending = all(&addresses);

        Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);

        assert_eq!(addresses[0].status.messages, vec!["Topic nowhere not found".to_string()]);
    }

    #[test]
    fn test_subscriptions_spread_over_topic_shards() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let topic = Address::new("ns", "space", "t1", AddressType::Topic, "large-topic")
            .with_annotation(annotations::CLUSTER_ID, "topic-cluster")
            .with_phase(Phase::Active);
        let mut usage = UsageMap::new();
        usage.add(UsageBucket::Broker, "topic-cluster", 2.0);

        let mut addresses = vec![topic];
        for n in 0..5 {
            addresses.push(
                Address::new(
                    "ns",
                    "space",
                    format!("s{}", n),
                    AddressType::Subscription,
                    "small-subscription",
                )
                .with_topic("t1"),
            );
        }
        let pending: Vec<usize> = (1..addresses.len()).collect();

        let report = Scheduler::new(&plans, &infra).schedule(usage, &mut addresses, &pending);

        let brokers: Vec<_> = addresses[1..]
            .iter()
            .map(|a| a.broker_id().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            brokers,
            vec![
                "topic-cluster-0",
                "topic-cluster-0",
                "topic-cluster-0",
                "topic-cluster-1",
                "topic-cluster-1",
            ]
        );
        for address in &addresses[1..] {
            assert_eq!(address.cluster_id(), Some("topic-cluster"));
        }
        assert!(report
            .usage
            .instances(UsageBucket::Subscription)
            .all(|(_, info)| info.used() <= 1.0 + 1e-9));
    }

    #[test]
    fn test_full_topic_shards_are_infeasible() {
        let plans = plans(1.0, 4.0, None);
        let infra = infra();
        let topic = Address::new("ns", "space", "t1", AddressType::Topic, "large-topic")
            .with_annotation(annotations::CLUSTER_ID, "topic-cluster")
            .with_phase(Phase::Active);
        let mut usage = UsageMap::new();
        usage.add(UsageBucket::Broker, "topic-cluster", 2.0);
        usage.add(UsageBucket::Subscription, "topic-cluster-0", 0.9);
        usage.add(UsageBucket::Subscription, "topic-cluster-1", 0.9);
        // Not a shard of this cluster: no index suffix.
        usage.add(UsageBucket::Subscription, "topic-cluster-extra", 0.0);

        let mut addresses = vec![
            topic,
            Address::new("ns", "space", "s1", AddressType::Subscription, "small-subscription")
                .with_topic("t1"),
        ];

        let report = Scheduler::new(&plans, &infra).schedule(usage, &mut addresses, &[1]);

        assert!(matches!(
            report.outcomes[&addresses[1].key()],
            AddressOutcome::Infeasible { .. }
        ));
    }

    #[test]
    fn test_scheduling_is_deterministic() {
        let plans = plans(2.0, 3.0, None);
        let infra = infra();
        let build = || {
            vec![
                queue("q3", "medium-queue"),
                queue("q1", "small-queue"),
                queue("big", "large-queue"),
                queue("q2", "medium-queue"),
                queue("q4", "small-queue"),
            ]
        };

        let mut first = build();
        let mut second = build();
        second.reverse();
        let pending = all(&first);

        let a = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut first, &pending);
        let b = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut second, &pending);

        second.reverse();
        assert_eq!(first, second);
        assert_eq!(a.outcomes, b.outcomes);
        assert_eq!(a.usage, b.usage);
    }

    proptest! {
        #[test]
        fn prop_quota_invariants_hold(
            credits in prop::collection::vec(5u32..=95, 1..24),
            broker_max in 0u32..6,
            aggregate in prop::option::of(0u32..6),
        ) {
            let mut plans = PlanSet::new(
                1,
                AddressSpacePlan {
                    name: "prop".to_string(),
                    resources: vec![ResourceAllowance {
                        resource: ResourceKind::Broker,
                        max: f64::from(broker_max),
                    }],
                    aggregate: aggregate.map(f64::from),
                },
            );
            let mut addresses = Vec::new();
            for (n, credit) in credits.iter().enumerate() {
                let plan = format!("p{}", credit);
                plans = plans.with_address_plan(AddressPlan::new(
                    plan.clone(),
                    AddressType::Queue,
                    vec![ResourceRequest::new(ResourceKind::Broker, f64::from(*credit) / 100.0)],
                ));
                addresses.push(queue(&format!("q{:02}", n), &plan));
            }
            let infra = infra();
            let pending = all(&addresses);

            let report = Scheduler::new(&plans, &infra).schedule(UsageMap::new(), &mut addresses, &pending);
            let limits = plans.limits();

            for (_, info) in report.usage.instances(UsageBucket::Broker) {
                prop_assert!(info.used() < 1.0);
            }
            prop_assert!(f64::from(report.usage.needed(UsageBucket::Broker)) <= f64::from(broker_max));
            prop_assert!(f64::from(report.usage.aggregate_needed()) <= limits.aggregate + 1e-9);
            for address in &addresses {
                let bound = address.phase() == Phase::Configuring;
                prop_assert_eq!(bound, address.broker_id().is_some());
            }
        }
    }
}
