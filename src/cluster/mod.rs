//! Node wiring: routing, table management, and discovery.
//!
//! The [`Node`] binds a transport to the per-table replicas: a dispatcher
//! task drains the transport's inbound queue, merges Lamport stamps, and
//! routes each envelope to its table's inbox. Envelopes for unknown tables
//! feed the discovery path instead of being dropped.

pub mod manager;
pub mod node;
pub mod router;

pub use manager::{TableListing, TableManager};
pub use node::{ClusterError, Node};
pub use router::Router;
