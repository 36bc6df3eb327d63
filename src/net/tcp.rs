//! TCP broadcast transport.
//!
//! A listener accepts inbound peers and [`TcpTransport::add_peer`] dials
//! outbound ones; after that both kinds are equal. One reader task per
//! connection feeds the shared inbound queue; a single broadcast task
//! drains the outbound queue, encodes each envelope once, and fans the
//! frame out to every connected peer's writer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, watch};

use super::codec;
use super::errors::NetError;
use super::transport::{QUEUE_CAPACITY, Transport};
use crate::protocol::NetMessage;

const PEER_WRITE_QUEUE: usize = 64;

type PeerMap = Arc<RwLock<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>>;

/// Broadcast transport over plain TCP.
pub struct TcpTransport {
    listen_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    outbox_tx: mpsc::Sender<NetMessage>,
    outbox_rx: Option<mpsc::Receiver<NetMessage>>,
    inbox_tx: mpsc::Sender<NetMessage>,
    inbox_rx: Option<mpsc::Receiver<NetMessage>>,
    peers: PeerMap,
    shutdown: Option<watch::Receiver<bool>>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(listen_addr: SocketAddr) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            listen_addr,
            local_addr: None,
            outbox_tx,
            outbox_rx: Some(outbox_rx),
            inbox_tx,
            inbox_rx: Some(inbox_rx),
            peers: Arc::new(RwLock::new(HashMap::new())),
            shutdown: None,
        }
    }

    /// The bound listen address, available after [`Transport::start`].
    /// Useful when binding to port 0.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Dial a remote peer and remember it for future broadcasts.
    pub async fn add_peer(&self, addr: SocketAddr) -> Result<(), NetError> {
        let shutdown = self.shutdown.clone().ok_or(NetError::NotStarted)?;
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        register_peer(addr, stream, self.peers.clone(), self.inbox_tx.clone(), shutdown).await;
        Ok(())
    }

    /// Count of currently connected peers.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn outbox(&self) -> mpsc::Sender<NetMessage> {
        self.outbox_tx.clone()
    }

    fn take_inbox(&mut self) -> Option<mpsc::Receiver<NetMessage>> {
        self.inbox_rx.take()
    }

    async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), NetError> {
        let outbox_rx = self.outbox_rx.take().ok_or(NetError::NotStarted)?;
        let listener = TcpListener::bind(self.listen_addr).await?;
        self.local_addr = Some(listener.local_addr()?);
        self.shutdown = Some(shutdown.clone());
        log::info!("tcp listening on {}", listener.local_addr()?);

        spawn_accept_loop(
            listener,
            self.peers.clone(),
            self.inbox_tx.clone(),
            shutdown.clone(),
        );
        spawn_broadcast_loop(outbox_rx, self.peers.clone(), shutdown);
        Ok(())
    }

    async fn close(&mut self) {
        // Dropping the writer senders ends each peer's writer task; readers
        // end on the shutdown signal or when the peer hangs up.
        self.peers.write().await.clear();
    }
}

fn spawn_accept_loop(
    listener: TcpListener,
    peers: PeerMap,
    inbox_tx: mpsc::Sender<NetMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            log::warn!("set_nodelay for {addr}: {err}");
                        }
                        register_peer(
                            addr,
                            stream,
                            peers.clone(),
                            inbox_tx.clone(),
                            shutdown.clone(),
                        )
                        .await;
                    }
                    Err(err) => {
                        if *shutdown.borrow() {
                            return;
                        }
                        log::warn!("accept error: {err}");
                    }
                },
                _ = shutdown.changed() => return,
            }
        }
    });
}

fn spawn_broadcast_loop(
    mut outbox_rx: mpsc::Receiver<NetMessage>,
    peers: PeerMap,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = outbox_rx.recv() => match maybe {
                    Some(msg) => {
                        let frame = match codec::encode_frame(&msg) {
                            Ok(frame) => frame,
                            Err(err) => {
                                log::error!("encode error: {err}");
                                continue;
                            }
                        };
                        // Snapshot the peer list under the read lock, release
                        // it before any channel send.
                        let targets: Vec<(SocketAddr, mpsc::Sender<Vec<u8>>)> = peers
                            .read()
                            .await
                            .iter()
                            .map(|(addr, tx)| (*addr, tx.clone()))
                            .collect();
                        for (addr, tx) in targets {
                            if tx.send(frame.clone()).await.is_err() {
                                log::debug!("peer {addr} gone, frame dropped");
                            }
                        }
                    }
                    None => return,
                },
                _ = shutdown.changed() => return,
            }
        }
    });
}

/// Register a connection: one writer task fed by a bounded frame queue,
/// one reader task feeding the shared inbound queue. A decode failure or
/// oversize frame closes this connection only.
async fn register_peer(
    addr: SocketAddr,
    stream: TcpStream,
    peers: PeerMap,
    inbox_tx: mpsc::Sender<NetMessage>,
    shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(PEER_WRITE_QUEUE);

    if let Some(old) = peers.write().await.insert(addr, frame_tx) {
        drop(old); // replacing a stale connection ends its writer
    }
    log::info!("peer connected: {addr}");

    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(err) = write_half.write_all(&frame).await {
                log::warn!("write error to {addr}: {err}");
                break;
            }
        }
    });

    tokio::spawn(read_loop(addr, read_half, peers, inbox_tx, shutdown));
}

async fn read_loop(
    addr: SocketAddr,
    mut read_half: OwnedReadHalf,
    peers: PeerMap,
    inbox_tx: mpsc::Sender<NetMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = codec::read_frame(&mut read_half) => match result {
                Ok(msg) => {
                    if inbox_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(NetError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => {
                    log::warn!("read error from {addr}: {err}");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    peers.write().await.remove(&addr);
    log::info!("peer disconnected: {addr}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MsgType, NodeId, TableId};

    fn heartbeat(epoch: u64) -> NetMessage {
        NetMessage {
            table: TableId::from("t-1"),
            from: NodeId::from("n-1"),
            kind: MsgType::Heartbeat,
            epoch,
            lamport: 1,
            seq: 0,
            action: None,
            state: None,
        }
    }

    async fn started_pair() -> (TcpTransport, TcpTransport, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut a = TcpTransport::new("127.0.0.1:0".parse().unwrap());
        let mut b = TcpTransport::new("127.0.0.1:0".parse().unwrap());
        a.start(shutdown_rx.clone()).await.unwrap();
        b.start(shutdown_rx).await.unwrap();
        (a, b, shutdown_tx)
    }

    #[tokio::test]
    async fn dialed_peer_receives_broadcasts() {
        let (a, mut b, _shutdown) = started_pair().await;
        let mut b_inbox = b.take_inbox().unwrap();
        a.add_peer(b.local_addr().unwrap()).await.unwrap();

        a.outbox().send(heartbeat(7)).await.unwrap();
        let received = b_inbox.recv().await.unwrap();
        assert_eq!(received.epoch, 7);
    }

    #[tokio::test]
    async fn accepted_peer_can_reply() {
        let (mut a, b, _shutdown) = started_pair().await;
        let mut a_inbox = a.take_inbox().unwrap();
        a.add_peer(b.local_addr().unwrap()).await.unwrap();

        // Wait for b to accept, then broadcast back over the same socket.
        let deadline = tokio::time::Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            while b.peer_count().await == 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        b.outbox().send(heartbeat(3)).await.unwrap();
        let received = a_inbox.recv().await.unwrap();
        assert_eq!(received.epoch, 3);
    }

    #[tokio::test]
    async fn add_peer_before_start_fails() {
        let transport = TcpTransport::new("127.0.0.1:0".parse().unwrap());
        let err = transport
            .add_peer("127.0.0.1:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::NotStarted));
    }
}
