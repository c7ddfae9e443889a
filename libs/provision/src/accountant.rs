//! Usage baseline from already bound addresses.

use std::collections::BTreeMap;

use msgplane_model::{Address, AddressKey, AddressType, PlanSet, ResourceKind};
use tracing::{debug, warn};

use crate::{ProvisionError, ProvisionResult, UsageBucket, UsageMap, ALL_INSTANCES};

/// Sum the credit of bound addresses into a fresh usage map.
///
/// Addresses whose plan cannot be resolved, or that lack the identity
/// annotation a request is keyed by, are skipped with a warning. Two
/// different addresses carrying the same sharded cluster id fail the pass.
pub fn compute_usage<'a>(
    addresses: impl IntoIterator<Item = &'a Address>,
    plans: &PlanSet,
) -> ProvisionResult<UsageMap> {
    let mut usage = UsageMap::new();
    let mut sharded_owners: BTreeMap<String, AddressKey> = BTreeMap::new();

    for address in addresses {
        let plan = match plans.plan_for(address) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(address = %address.name, error = %e, "Skipping usage of address");
                continue;
            }
        };

        for request in &plan.resources {
            match (request.resource, address.address_type) {
                (ResourceKind::Router, _) => {
                    usage.add(UsageBucket::Router, ALL_INSTANCES, request.credit);
                }
                (ResourceKind::Broker, AddressType::Subscription) => {
                    let Some(broker_id) = address.broker_id() else {
                        warn!(address = %address.name, "Bound subscription has no broker-id");
                        continue;
                    };
                    usage.add(UsageBucket::Subscription, broker_id, request.credit);
                }
                (ResourceKind::Broker, _) if request.is_pooled() => {
                    let Some(broker_id) = address.broker_id() else {
                        warn!(address = %address.name, "Bound pooled address has no broker-id");
                        continue;
                    };
                    usage.add(UsageBucket::Broker, broker_id, request.credit);
                }
                (ResourceKind::Broker, _) => {
                    let Some(cluster_id) = address.cluster_id() else {
                        warn!(address = %address.name, "Bound sharded address has no cluster-id");
                        continue;
                    };
                    let key = address.key();
                    if let Some(owner) = sharded_owners.get(cluster_id) {
                        if *owner != key {
                            return Err(ProvisionError::ClusterIdConflict {
                                cluster_id: cluster_id.to_string(),
                                first: owner.to_string(),
                                second: key.to_string(),
                            });
                        }
                    }
                    sharded_owners.insert(cluster_id.to_string(), key);
                    usage.add(UsageBucket::Broker, cluster_id, request.credit);
                }
            }
        }
    }

    debug!(
        router = usage.needed(UsageBucket::Router),
        broker = usage.needed(UsageBucket::Broker),
        subscription = usage.needed(UsageBucket::Subscription),
        "Computed usage baseline"
    );

    Ok(usage)
}
