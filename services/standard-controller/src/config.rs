//! Configuration for the standard controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use msgplane_naming::InfraUuid;
use msgplane_provision::InfraConfig;

/// Standard controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the address space this controller manages.
    pub address_space: String,

    /// Namespace the address space lives in.
    pub address_space_namespace: String,

    /// Name of the address space plan.
    pub address_space_plan: String,

    /// Suffix of every infrastructure object of the address space.
    pub infra_uuid: InfraUuid,

    /// Interval between plan reloads.
    pub resync_interval: Duration,

    /// Interval between provisioning passes.
    pub check_interval: Duration,

    /// Interval between router status checks.
    pub status_check_interval: Duration,

    /// Timeout of a single router management query.
    pub management_query_timeout: Duration,

    /// The router is never scaled below this.
    pub router_min_replicas: u32,

    /// Emit controller events through the tracing logger.
    pub enable_event_logger: bool,

    /// Optional JSON plan set replacing the built-in plans.
    pub plan_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let secs = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(v) => v
                    .parse()
                    .ok()
                    .filter(|&s: &u64| s > 0)
                    .map(Duration::from_secs)
                    .with_context(|| {
                        format!("{} must be a positive number of seconds, got '{}'", key, v)
                    }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let address_space = required("ADDRESS_SPACE")?;
        let address_space_namespace = required("ADDRESS_SPACE_NAMESPACE")?;
        let address_space_plan = required("ADDRESS_SPACE_PLAN")?;
        let infra_uuid = InfraUuid::parse(&required("INFRA_UUID")?).context("invalid INFRA_UUID")?;

        let router_min_replicas = match lookup("ROUTER_MIN_REPLICAS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("ROUTER_MIN_REPLICAS must be a number, got '{}'", v))?,
            None => 1,
        };

        let enable_event_logger = lookup("ENABLE_EVENT_LOGGER")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let plan_file = lookup("PLAN_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let log_level = lookup("MSGPLANE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            address_space,
            address_space_namespace,
            address_space_plan,
            infra_uuid,
            resync_interval: secs("RESYNC_INTERVAL", 300)?,
            check_interval: secs("CHECK_INTERVAL", 30)?,
            status_check_interval: secs("STATUS_CHECK_INTERVAL", 30)?,
            management_query_timeout: secs("MANAGEMENT_QUERY_TIMEOUT", 60)?,
            router_min_replicas,
            enable_event_logger,
            plan_file,
            log_level,
        })
    }

    /// Infrastructure settings handed to the provisioner.
    pub fn infra(&self) -> InfraConfig {
        InfraConfig {
            infra_uuid: self.infra_uuid.clone(),
            min_router_replicas: self.router_min_replicas,
        }
    }
}
