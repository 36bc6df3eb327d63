//! Opaque identifiers for nodes, tables, and actions.
//!
//! All three are string-backed so they serialize naturally into the JSON
//! envelope and compare lexicographically (the node id ordering doubles as
//! the authority-takeover tie-break).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a node in the mesh. Unique per process with high probability.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh node id.
    pub fn generate() -> Self {
        Self(format!("n-{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifies a table across the mesh.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Generate a fresh table id.
    pub fn generate() -> Self {
        Self(format!("t-{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TableId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifies a single action for deduplication. Replaying an id is a no-op.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh action id.
    pub fn generate() -> Self {
        Self(format!("a-{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 64-bit FNV-1a hash of the id, used to seed deterministic shuffles so
    /// that every replica executes the same deal for the same commit.
    #[must_use]
    pub fn seed(&self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.0.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_distinct() {
        let ids: HashSet<NodeId> = (0..100).map(|_| NodeId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn node_ids_order_lexicographically() {
        let a = NodeId::from("n-aaa");
        let b = NodeId::from("n-bbb");
        assert!(a < b);
    }

    #[test]
    fn action_seed_is_stable() {
        let id = ActionId::from("a-fixed");
        assert_eq!(id.seed(), ActionId::from("a-fixed").seed());
        assert_ne!(id.seed(), ActionId::from("a-other").seed());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = TableId::from("t-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"t-123\"");
        let back: TableId = serde_json::from_str("\"t-123\"").unwrap();
        assert_eq!(back, id);
    }
}
