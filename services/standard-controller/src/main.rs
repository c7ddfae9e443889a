//! msgplane Standard Controller
//!
//! The standard controller runs once per address space. It places addresses
//! on routers and brokers within the address space quota, provisions the
//! broker clusters they need and reports address readiness.
//!
//! ## Architecture
//!
//! - **Provisioner**: accounts usage, schedules pending addresses, creates brokers
//! - **Status checker**: queries every router and promotes ready addresses
//! - **Worker**: drives passes, status checks and plan reloads on intervals

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use msgplane_events::{EventLogger, NoopEventLogger, TracingEventLogger};
use msgplane_standard_controller::{
    config::ControllerConfig,
    controller::{AddressController, ControllerDeps, ControllerWorker, WorkerConfig},
    memory::InMemoryBackend,
    plans::load_plans,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        address_space = %config.address_space,
        namespace = %config.address_space_namespace,
        plan = %config.address_space_plan,
        infra_uuid = %config.infra_uuid,
        "Starting msgplane standard controller"
    );

    let plans = load_plans(&config)?;

    let events: Arc<dyn EventLogger> = if config.enable_event_logger {
        Arc::new(TracingEventLogger)
    } else {
        Arc::new(NoopEventLogger)
    };

    // In-memory backend (no orchestrator client yet)
    let backend = Arc::new(InMemoryBackend::new(
        format!("qdrouterd-{}", config.infra_uuid),
        config.router_min_replicas,
    ));

    let controller = Arc::new(AddressController::new(
        config,
        plans,
        ControllerDeps {
            addresses: backend.clone(),
            clusters: backend.clone(),
            routers: backend.clone(),
            infra: backend,
            events,
        },
    ));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ControllerWorker::new(
        Arc::clone(&controller),
        WorkerConfig::from_controller(&controller),
    );
    let mut worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller worker panicked");
            }
            return Ok(());
        }
    }

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(Duration::from_secs(10), worker_handle)
        .await
        .is_err()
    {
        warn!("Controller worker did not stop in time");
    }

    info!("Standard controller shutdown complete");
    Ok(())
}
