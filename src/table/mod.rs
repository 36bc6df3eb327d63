//! Per-table replication: configuration and the replica event loop.
//!
//! Each table runs in its own Tokio task with a bounded inbox of network
//! envelopes (fed by the router) and a command channel for local proposals
//! and state queries. The authority replica orders actions into a commit
//! stream and emits heartbeats; follower replicas mirror the stream and
//! promote themselves when the authority goes silent.

pub mod config;
pub mod replica;

pub use config::TableConfig;
pub use replica::{ReplicaCommand, TableHandle, TableReplica, TableSummary};
