//! Fractional usage accounting.

use std::collections::BTreeMap;

use msgplane_model::ResourceKind;

/// Instance key of the router bucket; router credit is not per instance.
pub const ALL_INSTANCES: &str = "all";

/// Float noise tolerated when converting credit to whole instances.
const CREDIT_EPSILON: f64 = 1e-9;

/// Usage bucket. Subscriptions are tracked apart from broker placement so
/// their credit never displaces queues or topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UsageBucket {
    Router,
    Broker,
    Subscription,
}

impl UsageBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Broker => "broker",
            Self::Subscription => "subscription",
        }
    }

    /// Resource whose allowance a request landing in this bucket is checked
    /// against, and the bucket whose instance count is compared.
    ///
    /// Subscription credit has no count of its own; it rides on the broker
    /// instances of its topic, so the broker count is checked instead.
    pub fn quota(&self) -> (ResourceKind, UsageBucket) {
        match self {
            Self::Router => (ResourceKind::Router, Self::Router),
            Self::Broker | Self::Subscription => (ResourceKind::Broker, Self::Broker),
        }
    }

    pub fn counts_toward_aggregate(&self) -> bool {
        !matches!(self, Self::Subscription)
    }
}

impl std::fmt::Display for UsageBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credit used on one instance and the whole instances that implies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageInfo {
    used: f64,
    needed: u32,
}

impl UsageInfo {
    pub fn used(&self) -> f64 {
        self.used
    }

    /// Always `ceil(used)`.
    pub fn needed(&self) -> u32 {
        self.needed
    }

    pub fn add_used(&mut self, credit: f64) {
        self.used += credit;
        self.needed = needed_for(self.used);
    }

    pub fn sub_used(&mut self, credit: f64) {
        self.used = (self.used - credit).max(0.0);
        self.needed = needed_for(self.used);
    }
}

fn needed_for(used: f64) -> u32 {
    if used <= CREDIT_EPSILON {
        return 0;
    }
    (used - CREDIT_EPSILON).ceil() as u32
}

/// `bucket -> instance id -> usage`, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageMap {
    buckets: BTreeMap<UsageBucket, BTreeMap<String, UsageInfo>>,
}

impl UsageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credit to an instance, creating the entry if needed.
    pub fn add(&mut self, bucket: UsageBucket, instance: &str, credit: f64) {
        self.entry(bucket, instance).add_used(credit);
    }

    /// Make sure an (empty) entry exists for an instance.
    pub fn ensure(&mut self, bucket: UsageBucket, instance: &str) {
        self.entry(bucket, instance);
    }

    fn entry(&mut self, bucket: UsageBucket, instance: &str) -> &mut UsageInfo {
        self.buckets
            .entry(bucket)
            .or_default()
            .entry(instance.to_string())
            .or_default()
    }

    pub fn get(&self, bucket: UsageBucket, instance: &str) -> Option<&UsageInfo> {
        self.buckets.get(&bucket)?.get(instance)
    }

    pub fn contains(&self, bucket: UsageBucket, instance: &str) -> bool {
        self.get(bucket, instance).is_some()
    }

    /// Credit used on an instance; zero if unknown.
    pub fn used(&self, bucket: UsageBucket, instance: &str) -> f64 {
        self.get(bucket, instance).map_or(0.0, UsageInfo::used)
    }

    /// Instances of a bucket in id order.
    pub fn instances(&self, bucket: UsageBucket) -> impl Iterator<Item = (&str, &UsageInfo)> {
        self.buckets
            .get(&bucket)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Whole instances needed by a bucket.
    pub fn needed(&self, bucket: UsageBucket) -> u32 {
        self.instances(bucket).map(|(_, u)| u.needed()).sum()
    }

    /// Whole instances needed across every bucket that counts toward the
    /// aggregate allowance.
    pub fn aggregate_needed(&self) -> u32 {
        self.buckets
            .keys()
            .filter(|b| b.counts_toward_aggregate())
            .map(|b| self.needed(*b))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(BTreeMap::is_empty)
    }
}
