//! Typed infra identifier and broker/cluster name derivation.

use sha2::{Digest, Sha256};

use crate::{sanitize_name, NamingError};

/// Prefix of every sharded cluster id.
pub const SHARDED_PREFIX: &str = "broker-sharded";

/// Short identifier of the infrastructure backing one address space.
///
/// Appears in every generated broker name so names from different address
/// spaces in one namespace never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfraUuid(String);

impl InfraUuid {
    /// Maximum length of an infra uuid.
    pub const MAX_LEN: usize = 16;

    /// Parses an infra uuid. Only `[a-z0-9]` is accepted.
    pub fn parse(s: &str) -> Result<Self, NamingError> {
        if s.is_empty() {
            return Err(NamingError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(NamingError::TooLong {
                len: s.len(),
                max: Self::MAX_LEN,
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        {
            return Err(NamingError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InfraUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for InfraUuid {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for InfraUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for InfraUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// 32-bit checksum: the first four bytes of SHA-256, big-endian.
pub fn checksum32(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Cluster id of a sharded address.
///
/// An existing `cluster-id` annotation wins (sanitized); otherwise the id is
/// derived from the address identity so it is stable across passes.
pub fn sharded_cluster_id(
    existing: Option<&str>,
    namespace: &str,
    address_space: &str,
    address: &str,
    infra_uuid: &InfraUuid,
) -> String {
    if let Some(existing) = existing.filter(|s| !s.is_empty()) {
        return sanitize_name(existing);
    }

    let mut input = String::with_capacity(namespace.len() + address_space.len() + address.len());
    input.push_str(namespace);
    input.push_str(address_space);
    input.push_str(address);
    let sum = checksum32(input.as_bytes());

    format!(
        "{}-{}-{}",
        SHARDED_PREFIX,
        hex::encode(sum.to_be_bytes()),
        infra_uuid
    )
}

/// Name of the `n`th pooled broker.
pub fn pooled_broker_id(infra_uuid: &InfraUuid, n: u32) -> String {
    format!("broker-{}-{}", infra_uuid, n)
}

/// Index of a pooled broker name, or `None` if the name is not pooled.
pub fn pooled_index(infra_uuid: &InfraUuid, id: &str) -> Option<u32> {
    let rest = id
        .strip_prefix("broker-")?
        .strip_prefix(infra_uuid.as_str())?
        .strip_prefix('-')?;
    parse_index(rest)
}

/// Lowest pooled index not present in `ids`.
pub fn next_pooled_index<'a>(
    infra_uuid: &InfraUuid,
    ids: impl IntoIterator<Item = &'a str>,
) -> u32 {
    let used: std::collections::BTreeSet<u32> = ids
        .into_iter()
        .filter_map(|id| pooled_index(infra_uuid, id))
        .collect();
    (0..).find(|n| !used.contains(n)).unwrap_or(0)
}

/// Name of shard broker `i` of a sharded cluster.
pub fn shard_broker_id(cluster_id: &str, i: u32) -> String {
    format!("{}-{}", cluster_id, i)
}

/// Shard index of a broker name within `cluster_id`, or `None` if the broker
/// does not belong to the cluster.
pub fn shard_index(cluster_id: &str, id: &str) -> Option<u32> {
    let rest = id.strip_prefix(cluster_id)?.strip_prefix('-')?;
    parse_index(rest)
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infra() -> InfraUuid {
        InfraUuid::parse("a1b2c3").unwrap()
    }

    #[test]
    fn test_infra_uuid_parse() {
        assert!(InfraUuid::parse("abc123").is_ok());
        assert_eq!(InfraUuid::parse(""), Err(NamingError::Empty));
        assert_eq!(
            InfraUuid::parse("ABC"),
            Err(NamingError::InvalidCharacter('A'))
        );
        assert!(matches!(
            InfraUuid::parse(&"a".repeat(17)),
            Err(NamingError::TooLong { len: 17, .. })
        ));
    }

    #[test]
    fn test_infra_uuid_serde() {
        let id: InfraUuid = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert!(serde_json::from_str::<InfraUuid>("\"a-b\"").is_err());
    }

    #[test]
    fn test_sharded_cluster_id_format() {
        let id = sharded_cluster_id(None, "ns1", "space1", "orders", &infra());
        let expected = format!(
            "broker-sharded-{:08x}-a1b2c3",
            checksum32(b"ns1space1orders")
        );
        assert_eq!(id, expected);
        assert_eq!(id.len(), "broker-sharded-".len() + 8 + 1 + 6);
    }

    #[test]
    fn test_checksum_is_pinned() {
        // Cluster ids are persisted; this value must never change.
        assert_eq!(checksum32(b"tenantmyspaceorders"), 0x7315_8d9b);
        assert_eq!(
            sharded_cluster_id(None, "tenant", "myspace", "orders", &infra()),
            "broker-sharded-73158d9b-a1b2c3"
        );
    }

    #[test]
    fn test_sharded_cluster_id_is_stable() {
        let a = sharded_cluster_id(None, "ns1", "space1", "orders", &infra());
        let b = sharded_cluster_id(None, "ns1", "space1", "orders", &infra());
        let c = sharded_cluster_id(None, "ns1", "space1", "invoices", &infra());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sharded_cluster_id_reuses_annotation() {
        let id = sharded_cluster_id(Some("My_Cluster"), "ns1", "space1", "orders", &infra());
        assert_eq!(id, "my-cluster");

        let derived = sharded_cluster_id(Some(""), "ns1", "space1", "orders", &infra());
        assert!(derived.starts_with(SHARDED_PREFIX));
    }

    #[test]
    fn test_pooled_index() {
        let infra = infra();
        assert_eq!(pooled_broker_id(&infra, 3), "broker-a1b2c3-3");
        assert_eq!(pooled_index(&infra, "broker-a1b2c3-3"), Some(3));
        assert_eq!(pooled_index(&infra, "broker-other-3"), None);
        assert_eq!(pooled_index(&infra, "broker-a1b2c3-3-0"), None);
        assert_eq!(pooled_index(&infra, "broker-a1b2c3-"), None);

        let sharded = sharded_cluster_id(None, "ns", "s", "q", &infra);
        assert_eq!(pooled_index(&infra, &sharded), None);
    }

    #[test]
    fn test_next_pooled_index_fills_gaps() {
        let infra = infra();
        assert_eq!(next_pooled_index(&infra, []), 0);
        assert_eq!(
            next_pooled_index(&infra, ["broker-a1b2c3-0", "broker-a1b2c3-2"]),
            1
        );
        assert_eq!(
            next_pooled_index(&infra, ["broker-a1b2c3-0", "broker-sharded-x"]),
            1
        );
    }

    #[test]
    fn test_shard_index() {
        let cluster = "broker-sharded-0011aabb-a1b2c3";
        let broker = shard_broker_id(cluster, 1);
        assert_eq!(shard_index(cluster, &broker), Some(1));
        assert_eq!(shard_index(cluster, "broker-a1b2c3-1"), None);
        assert_eq!(shard_index(cluster, cluster), None);
    }
}
