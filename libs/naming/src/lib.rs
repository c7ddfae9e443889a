//! # msgplane-naming
//!
//! Deterministic identity for broker infrastructure.
//!
//! ## Design Principles
//!
//! - Identifiers are derived, never looked up: the same inputs always produce
//!   the same name, across passes and across controller restarts
//! - Every generated name is a valid orchestrator object name
//!
//! ## Formats
//!
//! - Pooled broker: `broker-{infra_uuid}-{n}` (shared, one replica)
//! - Sharded cluster: `broker-sharded-{checksum}-{infra_uuid}`
//! - Shard broker inside a cluster: `{cluster_id}-{i}`
//!
//! The checksum is 32 bits of SHA-256 over `namespace + address_space + address`.

mod error;
mod ids;
mod sanitize;

pub use error::NamingError;
pub use ids::*;
pub use sanitize::{sanitize_name, MAX_NAME_LEN};
