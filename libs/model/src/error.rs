//! Error types for model parsing and plan resolution.

use thiserror::Error;

/// Errors raised while parsing model values or resolving plans.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The address type string is not one of the known types.
    #[error("unknown address type: {0}")]
    UnknownAddressType(String),

    /// The resource name is not one of the known resource kinds.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// No address plan with this name exists in the plan set.
    #[error("unknown address plan: {0}")]
    UnknownPlan(String),

    /// The address references a plan built for a different address type.
    #[error("plan '{plan}' is for {expected} addresses, not {actual}")]
    PlanTypeMismatch {
        plan: String,
        expected: String,
        actual: String,
    },

    /// The plan set failed validation.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The plan set document could not be decoded.
    #[error("plan decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ModelError {
    /// Returns true if this error comes from plan lookup rather than parsing.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            ModelError::UnknownPlan(_) | ModelError::PlanTypeMismatch { .. }
        )
    }
}
