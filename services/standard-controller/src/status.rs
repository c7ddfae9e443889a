//! Router status verification.
//!
//! Every router is queried in parallel with a bounded timeout. An address is
//! ready when each router that answered carries the configuration its type
//! needs and, for queues and topics, its broker cluster is up. Ready
//! Configuring addresses become Active.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use msgplane_events::{Event, EventLogger, EventReason, ObjectKind};
use msgplane_model::{Address, AddressType, Phase};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::{ClusterApi, RouterConfig, RouterProbe};

/// Status message of an address whose broker cluster is down.
pub const CLUSTER_UNAVAILABLE: &str = "Cluster is unavailable";

/// Outcome of a status check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Bound addresses examined.
    pub checked: usize,
    /// Addresses that became Active.
    pub activated: usize,
    /// Bound addresses found not ready.
    pub not_ready: usize,
    /// Routers that failed or timed out.
    pub failed_routers: usize,
}

/// Checks bound addresses against the router configuration.
pub struct StatusChecker {
    probe: Arc<dyn RouterProbe>,
    clusters: Arc<dyn ClusterApi>,
    events: Arc<dyn EventLogger>,
    timeout: Duration,
}

impl StatusChecker {
    pub fn new(
        probe: Arc<dyn RouterProbe>,
        clusters: Arc<dyn ClusterApi>,
        events: Arc<dyn EventLogger>,
        timeout: Duration,
    ) -> Self {
        Self {
            probe,
            clusters,
            events,
            timeout,
        }
    }

    /// Update readiness of every bound address in place.
    ///
    /// When no router answers the addresses are left untouched.
    pub async fn check(&self, addresses: &mut [Address]) -> StatusReport {
        let mut report = StatusReport::default();
        let configs = self.collect(&mut report).await;

        if configs.is_empty() {
            debug!(failed_routers = report.failed_routers, "No router configuration, skipping status update");
            return report;
        }

        let mut cluster_ready: BTreeMap<String, bool> = BTreeMap::new();

        for address in addresses.iter_mut().filter(|a| a.phase().is_bound()) {
            report.checked += 1;
            address.status.clear_messages().set_ready(true);

            for (router, config) in &configs {
                check_address(address, router, config);
            }

            if let Some(cluster_id) = backing_cluster(address) {
                let ready = match cluster_ready.get(&cluster_id) {
                    Some(&ready) => ready,
                    None => {
                        let ready = self.cluster_ready(&cluster_id).await;
                        cluster_ready.insert(cluster_id, ready);
                        ready
                    }
                };
                if !ready {
                    address
                        .status
                        .set_ready(false)
                        .append_message(CLUSTER_UNAVAILABLE);
                }
            }

            if address.status.ready {
                if address.phase() == Phase::Configuring {
                    address.status.set_phase(Phase::Active);
                    report.activated += 1;
                    info!(address = %address.name, "Address is active");
                }
            } else {
                report.not_ready += 1;
            }
        }

        report
    }

    async fn cluster_ready(&self, cluster_id: &str) -> bool {
        match self.clusters.is_cluster_ready(cluster_id).await {
            Ok(ready) => {
                if !ready {
                    debug!(%cluster_id, "Broker cluster not ready");
                }
                ready
            }
            Err(e) => {
                warn!(%cluster_id, error = %e, "Failed to check broker cluster");
                false
            }
        }
    }

    /// Query every router, dropping the ones that fail.
    async fn collect(&self, report: &mut StatusReport) -> Vec<(String, RouterConfig)> {
        let routers = match self.probe.list_routers().await {
            Ok(routers) => routers,
            Err(e) => {
                warn!(error = %e, "Failed to list routers");
                report.failed_routers += 1;
                return Vec::new();
            }
        };

        let mut tasks = JoinSet::new();
        for router in routers {
            let probe = Arc::clone(&self.probe);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let result = tokio::time::timeout(timeout, probe.query(&router)).await;
                (router, result)
            });
        }

        let mut configs = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (router, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Router query task failed");
                    report.failed_routers += 1;
                    continue;
                }
            };
            let error = match result {
                Ok(Ok(config)) => {
                    configs.push((router, config));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.timeout),
            };

            warn!(%router, %error, "Router status check failed");
            report.failed_routers += 1;
            self.events.log(Event::warning(
                EventReason::RouterCheckFailed,
                format!("Error checking router {}: {}", router, error),
                ObjectKind::Router,
                router,
            ));
        }

        // Join order is completion order.
        configs.sort_by(|a, b| a.0.cmp(&b.0));
        configs
    }
}

/// Broker cluster a queue or topic is served from.
fn backing_cluster(address: &Address) -> Option<String> {
    match address.address_type {
        AddressType::Queue | AddressType::Topic => address.cluster_id().map(str::to_string),
        _ => None,
    }
}

fn check_address(address: &mut Address, router: &str, config: &RouterConfig) {
    let name = address.address.clone();

    if address.address_type != AddressType::Topic && !config.addresses.contains(&name) {
        address.status.set_ready(false).append_message(format!(
            "Address {} not found on {}",
            name, router
        ));
    }

    match address.address_type {
        AddressType::Queue if !config.auto_links.contains(&name) => {
            address.status.set_ready(false).append_message(format!(
                "Auto-links for {} not found on {}",
                name, router
            ));
        }
        AddressType::Topic if !config.link_routes.contains(&name) => {
            address.status.set_ready(false).append_message(format!(
                "Link route for {} not found on {}",
                name, router
            ));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use msgplane_events::RecordingEventLogger;
    use msgplane_model::{annotations, BrokerCluster, RouterCluster};
    use std::collections::{BTreeMap, BTreeSet};

    struct FakeProbe {
        routers: BTreeMap<String, Option<RouterConfig>>,
        delay: Duration,
    }

    #[async_trait]
    impl RouterProbe for FakeProbe {
        async fn list_routers(&self) -> Result<Vec<String>> {
            Ok(self.routers.keys().cloned().collect())
        }

        async fn query(&self, router: &str) -> Result<RouterConfig> {
            tokio::time::sleep(self.delay).await;
            match self.routers.get(router) {
                Some(Some(config)) => Ok(config.clone()),
                _ => anyhow::bail!("connection refused"),
            }
        }
    }

    /// Clusters are ready unless listed as down.
    struct FakeClusters {
        down: BTreeSet<String>,
    }

    #[async_trait]
    impl ClusterApi for FakeClusters {
        async fn list_broker_clusters(&self) -> Result<Vec<BrokerCluster>> {
            Ok(Vec::new())
        }

        async fn router_cluster(&self) -> Result<RouterCluster> {
            Ok(RouterCluster::new("router", 1))
        }

        async fn delete_broker_cluster(&self, _cluster_id: &str) -> Result<()> {
            Ok(())
        }

        async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool> {
            if cluster_id == "broken" {
                anyhow::bail!("api unavailable");
            }
            Ok(!self.down.contains(cluster_id))
        }
    }

    fn config(addresses: &[&str], auto_links: &[&str], link_routes: &[&str]) -> RouterConfig {
        let set = |items: &[&str]| -> BTreeSet<String> { items.iter().map(|s| s.to_string()).collect() };
        RouterConfig {
            addresses: set(addresses),
            auto_links: set(auto_links),
            link_routes: set(link_routes),
        }
    }

    fn checker(routers: Vec<(&str, Option<RouterConfig>)>, delay: Duration) -> (StatusChecker, Arc<RecordingEventLogger>) {
        checker_with_down(routers, delay, &[])
    }

    fn checker_with_down(
        routers: Vec<(&str, Option<RouterConfig>)>,
        delay: Duration,
        down: &[&str],
    ) -> (StatusChecker, Arc<RecordingEventLogger>) {
        let clusters = FakeClusters {
            down: down.iter().map(|s| s.to_string()).collect(),
        };
        let probe = FakeProbe {
            routers: routers
                .into_iter()
                .map(|(name, config)| (name.to_string(), config))
                .collect(),
            delay,
        };
        let events = Arc::new(RecordingEventLogger::new());
        let checker = StatusChecker::new(
            Arc::new(probe),
            Arc::new(clusters),
            events.clone(),
            Duration::from_millis(200),
        );
        (checker, events)
    }

    fn bound(address: &str, address_type: AddressType) -> Address {
        Address::new("ns", "space", address, address_type, "plan").with_phase(Phase::Configuring)
    }

    #[tokio::test]
    async fn test_configured_addresses_become_active() {
        let (checker, _) = checker(
            vec![
                ("router-0", Some(config(&["q1", "a1"], &["q1"], &["t1"]))),
                ("router-1", Some(config(&["q1", "a1"], &["q1"], &["t1"]))),
            ],
            Duration::ZERO,
        );
        let mut addresses = vec![
            bound("q1", AddressType::Queue),
            bound("t1", AddressType::Topic),
            bound("a1", AddressType::Anycast),
        ];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.activated, 3);
        assert!(addresses.iter().all(|a| a.phase() == Phase::Active && a.status.ready));
    }

    #[tokio::test]
    async fn test_missing_configuration_is_not_ready() {
        let (checker, _) = checker(
            vec![
                ("router-0", Some(config(&["q1"], &["q1"], &[]))),
                ("router-1", Some(config(&[], &[], &[]))),
            ],
            Duration::ZERO,
        );
        let mut addresses = vec![bound("q1", AddressType::Queue), bound("t1", AddressType::Topic)];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.not_ready, 2);
        assert_eq!(addresses[0].phase(), Phase::Configuring);
        assert_eq!(
            addresses[0].status.messages,
            vec![
                "Address q1 not found on router-1".to_string(),
                "Auto-links for q1 not found on router-1".to_string(),
            ]
        );
        assert_eq!(addresses[1].status.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_router_is_skipped() {
        let (checker, events) = checker(
            vec![
                ("router-0", Some(config(&["q1"], &["q1"], &[]))),
                ("router-1", None),
            ],
            Duration::ZERO,
        );
        let mut addresses = vec![bound("q1", AddressType::Queue)];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.failed_routers, 1);
        assert_eq!(events.count(EventReason::RouterCheckFailed), 1);
        assert_eq!(addresses[0].phase(), Phase::Active);
    }

    #[tokio::test]
    async fn test_timeouts_leave_status_untouched() {
        let (checker, events) = checker(
            vec![("router-0", Some(config(&["q1"], &["q1"], &[])))],
            Duration::from_secs(5),
        );
        let mut addresses = vec![bound("q1", AddressType::Queue)];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.failed_routers, 1);
        assert_eq!(report.checked, 0);
        assert_eq!(events.count(EventReason::RouterCheckFailed), 1);
        assert_eq!(addresses[0].phase(), Phase::Configuring);
    }

    #[tokio::test]
    async fn test_unavailable_cluster_keeps_address_configuring() {
        let (checker, _) = checker_with_down(
            vec![("router-0", Some(config(&["q1", "q2"], &["q1", "q2"], &["t1"])))],
            Duration::ZERO,
            &["broker-0"],
        );
        let mut addresses = vec![
            bound("q1", AddressType::Queue).with_annotation(annotations::CLUSTER_ID, "broker-0"),
            bound("q2", AddressType::Queue).with_annotation(annotations::CLUSTER_ID, "broker-1"),
            bound("t1", AddressType::Topic).with_annotation(annotations::CLUSTER_ID, "broker-0"),
        ];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.activated, 1);
        assert_eq!(report.not_ready, 2);
        assert_eq!(addresses[0].phase(), Phase::Configuring);
        assert!(!addresses[0].status.ready);
        assert_eq!(addresses[0].status.messages, vec![CLUSTER_UNAVAILABLE.to_string()]);
        assert_eq!(addresses[1].phase(), Phase::Active);
        assert_eq!(addresses[2].status.messages, vec![CLUSTER_UNAVAILABLE.to_string()]);
    }

    #[tokio::test]
    async fn test_cluster_check_failure_counts_as_unavailable() {
        let (checker, _) = checker(
            vec![("router-0", Some(config(&["q1", "a1"], &["q1"], &[])))],
            Duration::ZERO,
        );
        let mut addresses = vec![
            bound("q1", AddressType::Queue).with_annotation(annotations::CLUSTER_ID, "broken"),
            // Only queues and topics depend on a broker cluster.
            bound("a1", AddressType::Anycast).with_annotation(annotations::CLUSTER_ID, "broken"),
        ];

        checker.check(&mut addresses).await;

        assert_eq!(addresses[0].phase(), Phase::Configuring);
        assert_eq!(addresses[1].phase(), Phase::Active);
    }

    #[tokio::test]
    async fn test_pending_addresses_are_ignored() {
        let (checker, _) = checker(vec![("router-0", Some(RouterConfig::default()))], Duration::ZERO);
        let mut addresses = vec![Address::new("ns", "space", "q1", AddressType::Queue, "plan")];

        let report = checker.check(&mut addresses).await;

        assert_eq!(report.checked, 0);
        assert_eq!(addresses[0].phase(), Phase::Pending);
    }
}
