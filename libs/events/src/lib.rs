//! # msgplane-events
//!
//! Events emitted by the address space controller.
//!
//! ## Design Principles
//!
//! - Events are notifications, not state: losing one never changes a
//!   scheduling decision
//! - Logging an event cannot fail from the caller's point of view
//!
//! ## Event Shape
//!
//! Every event carries a reason (what happened), a type (`Normal` or
//! `Warning`), the kind and name of the object involved, a human readable
//! message and a timestamp.

mod envelope;
mod logger;
mod types;

pub use envelope::Event;
pub use logger::{EventLogger, NoopEventLogger, RecordingEventLogger, TracingEventLogger};
pub use types::*;
