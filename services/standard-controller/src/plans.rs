//! Plan set loading.
//!
//! Plans come from `PLAN_FILE` when configured, otherwise from the built-in
//! standard plans. Either way the controller works on an immutable snapshot
//! that is replaced wholesale on resync.

use anyhow::{bail, Context, Result};
use msgplane_model::{
    AddressPlan, AddressSpacePlan, AddressType, PlanSet, ResourceAllowance, ResourceDefinition,
    ResourceKind, ResourceRequest,
};
use tracing::{info, warn};

use crate::config::ControllerConfig;

/// Version stamped on the built-in plan set.
pub const BUILTIN_PLAN_VERSION: u64 = 1;

/// Load the plan set for the configured address space plan.
pub fn load_plans(config: &ControllerConfig) -> Result<PlanSet> {
    let plans = match &config.plan_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read plan file {}", path.display()))?;
            PlanSet::from_json(&json)
                .with_context(|| format!("invalid plan file {}", path.display()))?
        }
        None => builtin_plans(&config.address_space_plan)?,
    };

    if plans.address_space_plan.name != config.address_space_plan {
        warn!(
            configured = %config.address_space_plan,
            loaded = %plans.address_space_plan.name,
            "Loaded address space plan differs from the configured one"
        );
    }

    info!(
        version = plans.version,
        address_space_plan = %plans.address_space_plan.name,
        address_plans = plans.address_plans.len(),
        "Plans loaded"
    );
    Ok(plans)
}

/// The standard plans shipped with the controller.
pub fn builtin_plans(address_space_plan: &str) -> Result<PlanSet> {
    let (router, broker, aggregate) = match address_space_plan {
        "standard-small" => (1.0, 2.0, 2.0),
        "standard-medium" => (3.0, 3.0, 3.0),
        "standard-unlimited" => (10_000.0, 10_000.0, 10_000.0),
        other => bail!("unknown address space plan '{}'", other),
    };

    let space = AddressSpacePlan {
        name: address_space_plan.to_string(),
        resources: vec![
            ResourceAllowance {
                resource: ResourceKind::Router,
                max: router,
            },
            ResourceAllowance {
                resource: ResourceKind::Broker,
                max: broker,
            },
        ],
        aggregate: Some(aggregate),
    };

    let plan = |name: &str, address_type: AddressType, router: f64, broker: Option<f64>| {
        let mut resources = vec![ResourceRequest::new(ResourceKind::Router, router)];
        if let Some(credit) = broker {
            resources.push(ResourceRequest::new(ResourceKind::Broker, credit));
        }
        AddressPlan::new(name, address_type, resources)
    };

    let plans = PlanSet::new(BUILTIN_PLAN_VERSION, space)
        .with_address_plan(plan("standard-small-queue", AddressType::Queue, 0.01, Some(0.1)))
        .with_address_plan(plan("standard-medium-queue", AddressType::Queue, 0.01, Some(0.4)))
        .with_address_plan(plan("standard-large-queue", AddressType::Queue, 0.01, Some(1.0)))
        .with_address_plan(plan("standard-xlarge-queue", AddressType::Queue, 0.01, Some(2.0)))
        .with_address_plan(plan("standard-small-topic", AddressType::Topic, 0.01, Some(0.1)))
        .with_address_plan(plan("standard-large-topic", AddressType::Topic, 0.01, Some(1.0)))
        .with_address_plan(plan("standard-small-anycast", AddressType::Anycast, 0.01, None))
        .with_address_plan(plan("standard-small-multicast", AddressType::Multicast, 0.01, None))
        .with_address_plan(AddressPlan::new(
            "standard-small-subscription",
            AddressType::Subscription,
            vec![ResourceRequest::new(ResourceKind::Broker, 0.05)],
        ))
        .with_resource_definition(ResourceDefinition {
            name: ResourceKind::Broker.as_str().to_string(),
            template: "queue-persisted".to_string(),
            parameters: [("STORAGE_CAPACITY".to_string(), "2Gi".to_string())]
                .into_iter()
                .collect(),
        });

    plans.validate()?;
    Ok(plans)
}
