//! Wire-level leaf types shared by every component.
//!
//! Everything here is serializable, cheap to clone, and free of any game or
//! networking logic so it can sit at the bottom of the dependency graph:
//! opaque ids, the Lamport clock, the tagged action sum, and the network
//! message envelope.

pub mod action;
pub mod clock;
pub mod ids;
pub mod message;

pub use action::{Action, ActionKind};
pub use clock::LamportClock;
pub use ids::{ActionId, NodeId, TableId};
pub use message::{Epoch, MsgType, NetMessage, TableSnapshot};
