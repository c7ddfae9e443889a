//! Event logger interface and implementations.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::{Event, EventReason, EventType};

/// Sink for controller events.
///
/// Logging is fire-and-forget: implementations swallow their own failures.
pub trait EventLogger: Send + Sync {
    fn log(&self, event: Event);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn log(&self, event: Event) {
        match event.event_type {
            EventType::Normal => info!(
                reason = %event.reason,
                kind = %event.kind,
                object = %event.object_name,
                "{}",
                event.message
            ),
            EventType::Warning => warn!(
                reason = %event.reason,
                kind = %event.kind,
                object = %event.object_name,
                "{}",
                event.message
            ),
        }
    }
}

/// Discards every event. Used when event logging is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventLogger;

impl EventLogger for NoopEventLogger {
    fn log(&self, _event: Event) {}
}

/// Keeps events in memory so callers can inspect them.
#[derive(Debug, Default)]
pub struct RecordingEventLogger {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded events with the given reason.
    pub fn count(&self, reason: EventReason) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.reason == reason)
            .count()
    }
}

impl EventLogger for RecordingEventLogger {
    fn log(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
