//! Address space controller.
//!
//! The controller is responsible for:
//! - Running provisioning passes over the address space
//! - Deleting broker clusters that lost their last address
//! - Promoting addresses to Active once every router serves them
//! - Reloading the plan set on resync

mod reconciler;
mod worker;

pub use reconciler::{AddressController, ControllerDeps, PassStats};
pub use worker::{ControllerWorker, WorkerConfig};
