//! The event record handed to an [`EventLogger`](crate::EventLogger).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventReason, EventType, ObjectKind};

/// A single controller event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub reason: EventReason,
    pub message: String,
    pub event_type: EventType,
    pub kind: ObjectKind,
    /// Name of the object the event is about (cluster id, address name, ...).
    pub object_name: String,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        reason: EventReason,
        message: impl Into<String>,
        event_type: EventType,
        kind: ObjectKind,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            message: message.into(),
            event_type,
            kind,
            object_name: object_name.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Shorthand for a `Normal` event.
    pub fn normal(
        reason: EventReason,
        message: impl Into<String>,
        kind: ObjectKind,
        object_name: impl Into<String>,
    ) -> Self {
        Self::new(reason, message, EventType::Normal, kind, object_name)
    }

    /// Shorthand for a `Warning` event.
    pub fn warning(
        reason: EventReason,
        message: impl Into<String>,
        kind: ObjectKind,
        object_name: impl Into<String>,
    ) -> Self {
        Self::new(reason, message, EventType::Warning, kind, object_name)
    }
}
