//! The transport capability set.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::errors::NetError;
use crate::protocol::NetMessage;

/// Capacity of a transport's inbound and outbound queues.
pub const QUEUE_CAPACITY: usize = 4096;

/// A duplex message stream.
///
/// Outbound envelopes are broadcast to every connected peer; inbound
/// envelopes from all peers drain into one queue, consumed by the node's
/// dispatcher. Both queues are bounded: a full outbox back-pressures the
/// table replicas, a full inbox back-pressures the peers.
#[async_trait]
pub trait Transport: Send {
    /// Sender half feeding the broadcast writer.
    fn outbox(&self) -> mpsc::Sender<NetMessage>;

    /// Take the inbound queue. Yields `None` after the first call; there
    /// is exactly one consumer.
    fn take_inbox(&mut self) -> Option<mpsc::Receiver<NetMessage>>;

    /// Spawn the transport's background tasks. They run until `shutdown`
    /// flips true or [`Transport::close`] is called.
    async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), NetError>;

    /// Stop accepting, drop all peer connections.
    async fn close(&mut self);
}
