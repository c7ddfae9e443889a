//! Event reason, kind and type enums.

use serde::{Deserialize, Serialize};

/// Why an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    BrokerCreated,
    BrokerCreateFailed,
    BrokerDeleted,
    BrokerDeleteFailed,
    RouterCheckFailed,
    AddressSyncFailed,
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventReason::BrokerCreated => "BrokerCreated",
            EventReason::BrokerCreateFailed => "BrokerCreateFailed",
            EventReason::BrokerDeleted => "BrokerDeleted",
            EventReason::BrokerDeleteFailed => "BrokerDeleteFailed",
            EventReason::RouterCheckFailed => "RouterCheckFailed",
            EventReason::AddressSyncFailed => "AddressSyncFailed",
        };
        write!(f, "{}", s)
    }
}

/// Kind of object an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    AddressSpace,
    Address,
    Broker,
    Router,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::AddressSpace => "AddressSpace",
            ObjectKind::Address => "Address",
            ObjectKind::Broker => "Broker",
            ObjectKind::Router => "Router",
        };
        write!(f, "{}", s)
    }
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn is_warning(&self) -> bool {
        matches!(self, EventType::Warning)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}
