//! Address provisioning engine.
//!
//! A provisioning pass turns the desired address set of one address space
//! into placements and infrastructure changes:
//!
//! - **Accountant**: sums the credit of already bound addresses into a
//!   [`UsageMap`]
//! - **Scheduler**: binds pending addresses to pooled brokers, sharded
//!   clusters or their topic's broker, within the address space quota
//! - **Materializer**: scales the router and creates missing broker clusters
//!
//! # Invariants
//!
//! - A pooled broker never carries a credit of one or more after a bind
//! - Aggregate need never exceeds the address space aggregate allowance
//! - Given the same inputs, a pass makes the same decisions
//! - A subscription is never bound before its topic
//!
//! [`Provisioner::provision`] is the entry point.

mod accountant;
mod error;
mod infra;
mod materializer;
mod provisioner;
mod scheduler;
mod usage;

pub use accountant::compute_usage;
pub use error::{ProvisionError, ProvisionResult};
pub use infra::{BrokerClusterKind, BrokerClusterSpec, InfraClient, InfraError, InfrastructureChanges};
pub use materializer::Materializer;
pub use provisioner::{InfraConfig, Provisioned, Provisioner};
pub use scheduler::{AddressOutcome, ScheduleReport, Scheduler, QUOTA_EXCEEDED};
pub use usage::{UsageBucket, UsageInfo, UsageMap, ALL_INSTANCES};
