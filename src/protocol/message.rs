//! The network message envelope and table snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::Action;
use super::ids::{NodeId, TableId};
use crate::game::EngineSnapshot;
use crate::table::TableConfig;

/// Monotonic term label; incremented on each authority takeover.
pub type Epoch = u64;

/// Envelope discriminator.
///
/// `Unknown` absorbs types introduced by newer peers; the dispatcher drops
/// them without aborting the connection.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgType {
    Propose,
    Commit,
    Snapshot,
    StateQuery,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Propose => "propose",
            Self::Commit => "commit",
            Self::Snapshot => "snapshot",
            Self::StateQuery => "state_query",
            Self::Heartbeat => "heartbeat",
            Self::Unknown => "unknown",
        };
        write!(f, "{repr}")
    }
}

/// The wire envelope carried by every transport frame.
///
/// Unknown fields are ignored on decode so older peers interoperate with
/// newer ones.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetMessage {
    pub table: TableId,
    pub from: NodeId,
    #[serde(rename = "type")]
    pub kind: MsgType,
    #[serde(default)]
    pub epoch: Epoch,
    #[serde(default)]
    pub lamport: u64,
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TableSnapshot>,
}

/// Network-serializable table state used for catch-up, discovery, and
/// authority handoffs.
///
/// The engine payload restores the observable public game only: the deck
/// and hole cards are deliberately absent (hidden-information handling is
/// out of scope, and the payload stays small and stable).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub cfg: TableConfig,
    pub seq: u64,
    pub epoch: Epoch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineSnapshot>,
}
