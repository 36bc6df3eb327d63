//! # Mesh Hold'em
//!
//! A peer-to-peer No-Limit Texas Hold'em engine for small meshes of nodes,
//! with no central server. Each table is an independently replicated state
//! machine: one node acts as *authority* and totally-orders actions into a
//! commit stream; the other nodes are *followers* that mirror the stream
//! and can take over authority when the current one goes silent.
//!
//! ## Architecture
//!
//! - [`game`]: the poker engine: deck, hand evaluation, betting state
//!   machine, phase progression, showdown payout. Single-owner mutable
//!   state, only ever touched by its table's event loop.
//! - [`table`]: the per-table replica, an async event loop fed by a
//!   bounded inbox of network envelopes plus a command channel for local
//!   proposals and state queries.
//! - [`cluster`]: node wiring: the router that demultiplexes inbound
//!   envelopes to table inboxes, the table manager, and snapshot-driven
//!   table discovery.
//! - [`protocol`]: wire-level leaf types: ids, the Lamport clock, the
//!   action sum, and the message envelope.
//! - [`net`]: the transport contract and its two implementations (TCP
//!   broadcast, in-process loopback), plus the length-prefixed JSON codec.
//!
//! ## Example
//!
//! ```no_run
//! use mesh_holdem::cluster::Node;
//! use mesh_holdem::net::LoopbackTransport;
//! use mesh_holdem::table::TableConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut transport = LoopbackTransport::new();
//!     let node = Node::start(&mut transport).await.unwrap();
//!     let table_id = node.create_table(TableConfig::default()).await.unwrap();
//!     let handle = node.manager().get_table(&table_id).await.unwrap();
//!     let summary = handle.summary().await.unwrap();
//!     println!("table {table_id}: phase={}", summary.phase);
//! }
//! ```

/// Wire-level leaf types: ids, Lamport clock, actions, envelopes.
pub mod protocol;
pub use protocol::{Action, ActionKind, LamportClock, NetMessage, NodeId, TableId};

/// Poker engine: cards, hand evaluation, betting state machine.
pub mod game;
pub use game::{Chips, EngineError, GameState};

/// Per-table replica: event loop, commit ordering, authority takeover.
pub mod table;
pub use table::{TableConfig, TableHandle, TableReplica};

/// Node wiring: router, table manager, discovery.
pub mod cluster;
pub use cluster::Node;

/// Transport contract and implementations.
pub mod net;
pub use net::{LoopbackTransport, TcpTransport, Transport};
