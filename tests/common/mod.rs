//! Shared test support: a pair of transports linked back to back, so two
//! nodes in one process talk to each other the way TCP peers would (no
//! local echo, reliable ordered delivery).

use async_trait::async_trait;
use mesh_holdem::net::{NetError, Transport};
use mesh_holdem::protocol::NetMessage;
use tokio::sync::{mpsc, watch};

const CAPACITY: usize = 1024;

/// Capture crate logs in test output. Safe to call from every test; only
/// the first call wins.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct LinkedTransport {
    outbox_tx: mpsc::Sender<NetMessage>,
    outbox_rx: Option<mpsc::Receiver<NetMessage>>,
    peer_inbox_tx: mpsc::Sender<NetMessage>,
    inbox_rx: Option<mpsc::Receiver<NetMessage>>,
}

/// Two transports where each side's broadcasts arrive on the other side's
/// inbound queue.
pub fn linked_pair() -> (LinkedTransport, LinkedTransport) {
    let (a_inbox_tx, a_inbox_rx) = mpsc::channel(CAPACITY);
    let (b_inbox_tx, b_inbox_rx) = mpsc::channel(CAPACITY);
    let (a_outbox_tx, a_outbox_rx) = mpsc::channel(CAPACITY);
    let (b_outbox_tx, b_outbox_rx) = mpsc::channel(CAPACITY);
    let a = LinkedTransport {
        outbox_tx: a_outbox_tx,
        outbox_rx: Some(a_outbox_rx),
        peer_inbox_tx: b_inbox_tx,
        inbox_rx: Some(a_inbox_rx),
    };
    let b = LinkedTransport {
        outbox_tx: b_outbox_tx,
        outbox_rx: Some(b_outbox_rx),
        peer_inbox_tx: a_inbox_tx,
        inbox_rx: Some(b_inbox_rx),
    };
    (a, b)
}

#[async_trait]
impl Transport for LinkedTransport {
    fn outbox(&self) -> mpsc::Sender<NetMessage> {
        self.outbox_tx.clone()
    }

    fn take_inbox(&mut self) -> Option<mpsc::Receiver<NetMessage>> {
        self.inbox_rx.take()
    }

    async fn start(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NetError> {
        let mut outbox_rx = self.outbox_rx.take().ok_or(NetError::NotStarted)?;
        let peer = self.peer_inbox_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = outbox_rx.recv() => match maybe {
                        Some(msg) => {
                            if peer.send(msg).await.is_err() {
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
