//! Controller background worker.
//!
//! Runs provisioning passes, status checks and plan reloads on their own
//! intervals until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::reconciler::AddressController;
use crate::plans::load_plans;

/// Worker intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Interval between provisioning passes.
    pub check_interval: Duration,
    /// Interval between status-only checks.
    pub status_check_interval: Duration,
    /// Interval between plan reloads.
    pub resync_interval: Duration,
}

impl WorkerConfig {
    pub fn from_controller(controller: &AddressController) -> Self {
        let config = controller.config();
        Self {
            check_interval: config.check_interval,
            status_check_interval: config.status_check_interval,
            resync_interval: config.resync_interval,
        }
    }
}

/// Worker that drives an [`AddressController`].
pub struct ControllerWorker {
    controller: Arc<AddressController>,
    config: WorkerConfig,
}

impl ControllerWorker {
    pub fn new(controller: Arc<AddressController>, config: WorkerConfig) -> Self {
        Self { controller, config }
    }

    /// Run the worker until shutdown is signaled.
    ///
    /// The first provisioning pass runs immediately.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            check_interval_secs = self.config.check_interval.as_secs(),
            status_check_interval_secs = self.config.status_check_interval.as_secs(),
            resync_interval_secs = self.config.resync_interval.as_secs(),
            "Starting controller worker"
        );

        let mut check = tokio::time::interval(self.config.check_interval);
        let mut status = tokio::time::interval(self.config.status_check_interval);
        let mut resync = tokio::time::interval(self.config.resync_interval);
        // The first pass already verifies status; the plans were loaded at startup.
        status.tick().await;
        resync.tick().await;

        loop {
            tokio::select! {
                _ = check.tick() => {
                    if let Err(e) = self.controller.reconcile_once().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
                _ = status.tick() => {
                    if let Err(e) = self.controller.check_status_once().await {
                        warn!(error = %e, "Status check failed");
                    }
                }
                _ = resync.tick() => {
                    self.reload_plans().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Controller worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn reload_plans(&self) {
        match load_plans(self.controller.config()) {
            Ok(plans) => self.controller.set_plans(plans).await,
            Err(e) => warn!(error = %e, "Failed to reload plans, keeping current set"),
        }
    }
}
