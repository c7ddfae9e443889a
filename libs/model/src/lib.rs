//! # msgplane-model
//!
//! Shared types for the standard address space controller.
//!
//! ## Design Principles
//!
//! - Addresses are plain values; a provisioning pass takes a snapshot and
//!   hands back updated copies
//! - Address types and resource kinds are closed enums
//! - Plans are immutable and grouped into a versioned [`PlanSet`] snapshot
//!
//! ## Overview
//!
//! - [`Address`]: a tenant-declared destination plus its identity annotations
//!   and placement status
//! - [`AddressPlan`] / [`AddressSpacePlan`]: resource credits requested per
//!   address and the quota ceilings of the address space
//! - [`BrokerCluster`] / [`RouterCluster`]: read-only infrastructure snapshot

mod address;
mod error;
mod infra;
mod plan;

pub use address::*;
pub use error::ModelError;
pub use infra::*;
pub use plan::*;
