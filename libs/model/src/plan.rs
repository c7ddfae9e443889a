//! Address plans, address space plans and the plan set snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Address, AddressType, ModelError};

// =============================================================================
// Resources
// =============================================================================

/// Infrastructure resource an address plan can request credit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Router,
    Broker,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Broker => "broker",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "router" => Ok(Self::Router),
            "broker" => Ok(Self::Broker),
            other => Err(ModelError::UnknownResource(other.to_string())),
        }
    }
}

/// Fractional share of one resource instance requested by an address plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub resource: ResourceKind,
    pub credit: f64,
}

impl ResourceRequest {
    pub fn new(resource: ResourceKind, credit: f64) -> Self {
        Self { resource, credit }
    }

    /// A broker request below one full instance shares a pooled broker.
    pub fn is_pooled(&self) -> bool {
        self.resource == ResourceKind::Broker && self.credit < 1.0
    }

    /// A broker request of one instance or more gets its own sharded cluster.
    pub fn is_sharded(&self) -> bool {
        self.resource == ResourceKind::Broker && self.credit >= 1.0
    }
}

// =============================================================================
// Plans
// =============================================================================

/// Immutable template describing what an address of a given plan consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPlan {
    pub name: String,
    pub address_type: AddressType,
    /// Requests in evaluation order.
    pub resources: Vec<ResourceRequest>,
}

impl AddressPlan {
    pub fn new(
        name: impl Into<String>,
        address_type: AddressType,
        resources: Vec<ResourceRequest>,
    ) -> Self {
        Self {
            name: name.into(),
            address_type,
            resources,
        }
    }

    /// Returns the broker request, if the plan has one.
    pub fn broker_request(&self) -> Option<&ResourceRequest> {
        self.resources
            .iter()
            .find(|r| r.resource == ResourceKind::Broker)
    }

    pub fn is_pooled(&self) -> bool {
        self.broker_request().is_some_and(ResourceRequest::is_pooled)
    }

    pub fn is_sharded(&self) -> bool {
        self.broker_request().is_some_and(ResourceRequest::is_sharded)
    }
}

/// Quota ceiling for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllowance {
    pub resource: ResourceKind,
    pub max: f64,
}

/// Quota ceilings of an address space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpacePlan {
    pub name: String,
    pub resources: Vec<ResourceAllowance>,
    /// Ceiling on the summed need across resources. Defaults to the sum of
    /// the per-resource maxima.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<f64>,
}

impl AddressSpacePlan {
    pub fn limits(&self) -> QuotaLimits {
        let mut per_resource = BTreeMap::new();
        for allowance in &self.resources {
            per_resource.insert(allowance.resource, allowance.max);
        }
        let aggregate = self
            .aggregate
            .unwrap_or_else(|| per_resource.values().sum());
        QuotaLimits {
            per_resource,
            aggregate,
        }
    }
}

/// Resolved quota ceilings used by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaLimits {
    pub per_resource: BTreeMap<ResourceKind, f64>,
    pub aggregate: f64,
}

impl QuotaLimits {
    /// Limit for a resource. A resource without an allowance may not be used.
    pub fn limit(&self, resource: ResourceKind) -> f64 {
        self.per_resource.get(&resource).copied().unwrap_or(0.0)
    }
}

/// Template handed to the orchestrator client when rendering broker clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

// =============================================================================
// Plan Set
// =============================================================================

/// Versioned, read-only snapshot of every plan a pass needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSet {
    pub version: u64,
    pub address_space_plan: AddressSpacePlan,
    pub address_plans: BTreeMap<String, AddressPlan>,
    /// Resource definitions keyed by resource name.
    #[serde(default)]
    pub resource_definitions: BTreeMap<String, ResourceDefinition>,
}

impl PlanSet {
    pub fn new(version: u64, address_space_plan: AddressSpacePlan) -> Self {
        Self {
            version,
            address_space_plan,
            address_plans: BTreeMap::new(),
            resource_definitions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_address_plan(mut self, plan: AddressPlan) -> Self {
        self.address_plans.insert(plan.name.clone(), plan);
        self
    }

    #[must_use]
    pub fn with_resource_definition(mut self, definition: ResourceDefinition) -> Self {
        self.resource_definitions
            .insert(definition.name.clone(), definition);
        self
    }

    /// Decode and validate a plan set document.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let plans: Self = serde_json::from_str(json)?;
        plans.validate()?;
        Ok(plans)
    }

    /// Check credits and allowances are usable numbers.
    pub fn validate(&self) -> Result<(), ModelError> {
        for plan in self.address_plans.values() {
            for request in &plan.resources {
                if !request.credit.is_finite() || request.credit <= 0.0 {
                    return Err(ModelError::InvalidPlan(format!(
                        "plan '{}' requests non-positive credit {} on {}",
                        plan.name, request.credit, request.resource
                    )));
                }
            }
            if plan.address_type.is_subscription() && plan.is_sharded() {
                return Err(ModelError::InvalidPlan(format!(
                    "subscription plan '{}' cannot request a full broker",
                    plan.name
                )));
            }
        }

        for allowance in &self.address_space_plan.resources {
            if !allowance.max.is_finite() || allowance.max < 0.0 {
                return Err(ModelError::InvalidPlan(format!(
                    "allowance for {} must be a non-negative number",
                    allowance.resource
                )));
            }
        }

        Ok(())
    }

    pub fn address_plan(&self, name: &str) -> Result<&AddressPlan, ModelError> {
        self.address_plans
            .get(name)
            .ok_or_else(|| ModelError::UnknownPlan(name.to_string()))
    }

    /// Resolve the plan of an address and check it matches the address type.
    pub fn plan_for(&self, address: &Address) -> Result<&AddressPlan, ModelError> {
        let plan = self.address_plan(&address.plan)?;
        if plan.address_type != address.address_type {
            return Err(ModelError::PlanTypeMismatch {
                plan: plan.name.clone(),
                expected: plan.address_type.to_string(),
                actual: address.address_type.to_string(),
            });
        }
        Ok(plan)
    }

    pub fn resource_definition(&self, resource: ResourceKind) -> Option<&ResourceDefinition> {
        self.resource_definitions.get(resource.as_str())
    }

    pub fn limits(&self) -> QuotaLimits {
        self.address_space_plan.limits()
    }
}
