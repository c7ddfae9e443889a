//! Address definitions and placement status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Annotation keys carrying infrastructure identity.
pub mod annotations {
    /// Broker cluster an address is bound to.
    pub const CLUSTER_ID: &str = "cluster-id";

    /// Broker instance inside the cluster (pooled addresses and subscriptions).
    pub const BROKER_ID: &str = "broker-id";
}

// =============================================================================
// Address Type
// =============================================================================

/// The kind of message destination an address declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Queue,
    Topic,
    Anycast,
    Multicast,
    Subscription,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Topic => "topic",
            Self::Anycast => "anycast",
            Self::Multicast => "multicast",
            Self::Subscription => "subscription",
        }
    }

    /// Returns true for durable subscriptions, which are placed next to their topic.
    pub fn is_subscription(&self) -> bool {
        matches!(self, Self::Subscription)
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AddressType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "topic" => Ok(Self::Topic),
            "anycast" => Ok(Self::Anycast),
            "multicast" => Ok(Self::Multicast),
            "subscription" => Ok(Self::Subscription),
            other => Err(ModelError::UnknownAddressType(other.to_string())),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Placement lifecycle of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Not yet schedulable, or rejected by quota.
    #[default]
    Pending,
    /// Bound to infrastructure; the change is not yet confirmed live.
    Configuring,
    /// Confirmed live by status verification.
    Active,
    /// Infrastructure for the address could not be created.
    Failed,
}

impl Phase {
    /// Returns true if the address holds a placement that counts toward usage.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Configuring | Self::Active)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Configuring => "Configuring",
            Self::Active => "Active",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Observed status of an address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressStatus {
    pub phase: Phase,
    pub ready: bool,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl AddressStatus {
    pub fn set_phase(&mut self, phase: Phase) -> &mut Self {
        self.phase = phase;
        self
    }

    pub fn set_ready(&mut self, ready: bool) -> &mut Self {
        self.ready = ready;
        self
    }

    /// Append a message unless an identical one is already present.
    pub fn append_message(&mut self, message: impl Into<String>) -> &mut Self {
        let message = message.into();
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
        self
    }

    pub fn clear_messages(&mut self) -> &mut Self {
        self.messages.clear();
        self
    }
}

// =============================================================================
// Address
// =============================================================================

/// Identity of an address within the address space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressKey {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for AddressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A tenant-declared message destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub namespace: String,
    pub address_space: String,
    /// Resource name, unique within the namespace.
    pub name: String,
    /// The address string clients attach to.
    pub address: String,
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub plan: String,
    /// Address string of the topic a subscription belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub status: AddressStatus,
}

impl Address {
    /// Create a pending address with no annotations.
    pub fn new(
        namespace: impl Into<String>,
        address_space: impl Into<String>,
        address: impl Into<String>,
        address_type: AddressType,
        plan: impl Into<String>,
    ) -> Self {
        let address = address.into();
        let address_space = address_space.into();
        Self {
            namespace: namespace.into(),
            name: format!("{}.{}", address_space, address),
            address_space,
            address,
            address_type,
            plan: plan.into(),
            topic: None,
            annotations: BTreeMap::new(),
            status: AddressStatus::default(),
        }
    }

    /// Set the topic reference (subscriptions only).
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, key: &str, value: impl Into<String>) -> Self {
        self.annotations.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.status.phase = phase;
        self
    }

    pub fn key(&self) -> AddressKey {
        AddressKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.annotation(annotations::CLUSTER_ID)
    }

    pub fn broker_id(&self) -> Option<&str> {
        self.annotation(annotations::BROKER_ID)
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.annotations.insert(key.to_string(), value.into());
    }

    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        self.annotations.remove(key)
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }
}
