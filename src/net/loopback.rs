//! In-process loopback transport.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::errors::NetError;
use super::transport::{QUEUE_CAPACITY, Transport};
use crate::protocol::NetMessage;

/// A transport that echoes every outbound envelope straight back to its
/// own inbound queue. Handy for single-process demos and tests: the node
/// sees its own broadcasts exactly the way a peer would.
pub struct LoopbackTransport {
    outbox_tx: mpsc::Sender<NetMessage>,
    outbox_rx: Option<mpsc::Receiver<NetMessage>>,
    inbox_tx: mpsc::Sender<NetMessage>,
    inbox_rx: Option<mpsc::Receiver<NetMessage>>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            outbox_tx,
            outbox_rx: Some(outbox_rx),
            inbox_tx,
            inbox_rx: Some(inbox_rx),
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn outbox(&self) -> mpsc::Sender<NetMessage> {
        self.outbox_tx.clone()
    }

    fn take_inbox(&mut self) -> Option<mpsc::Receiver<NetMessage>> {
        self.inbox_rx.take()
    }

    async fn start(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NetError> {
        let mut outbox_rx = self.outbox_rx.take().ok_or(NetError::NotStarted)?;
        let inbox_tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = outbox_rx.recv() => match maybe {
                        Some(msg) => {
                            if inbox_tx.send(msg).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                    _ = shutdown.changed() => return,
                }
            }
        });
        Ok(())
    }

    async fn close(&mut self) {}
}
