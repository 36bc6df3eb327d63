//! A mesh node: transport wiring, message dispatch, and table discovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot, watch};

use super::manager::TableManager;
use super::router::Router;
use crate::game::PlayerId;
use crate::net::{NetError, Transport};
use crate::protocol::{
    Action, ActionKind, Epoch, LamportClock, MsgType, NetMessage, NodeId, TableId,
};
use crate::table::{TableConfig, TableHandle};
use crate::table::replica::ReplicaClosed;

/// How long discovery waits for a snapshot before giving up.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors surfaced by node-level operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("table already exists")]
    TableExists,
    #[error("invalid table config: {0}")]
    InvalidConfig(String),
    #[error("discovery already in progress")]
    DiscoveryAlreadyInProgress,
    #[error("discover timeout (no snapshot received)")]
    DiscoverTimeout,
    #[error(transparent)]
    Replica(#[from] ReplicaClosed),
    #[error(transparent)]
    Net(#[from] NetError),
}

type DiscoveryWaiters = Arc<Mutex<HashMap<TableId, oneshot::Sender<NetMessage>>>>;

/// One process's participant in the mesh.
///
/// Owns the router and table manager, starts the transport, and runs the
/// dispatcher that drains the transport's inbound queue. The node id
/// doubles as this node's player id at every table it joins.
pub struct Node {
    id: NodeId,
    clock: Arc<LamportClock>,
    router: Arc<Router>,
    manager: Arc<TableManager>,
    outbox: mpsc::Sender<NetMessage>,
    waiters: DiscoveryWaiters,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Wire a node to `transport` and start dispatching.
    ///
    /// The transport stays with the caller (peer dialing is a shell-level
    /// concern); its background tasks stop when the node shuts down.
    pub async fn start(transport: &mut dyn Transport) -> Result<Self, ClusterError> {
        let id = NodeId::generate();
        let clock = Arc::new(LamportClock::new());
        let router = Arc::new(Router::new());
        let waiters: DiscoveryWaiters = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        transport.start(shutdown_rx.clone()).await?;
        let inbox = transport.take_inbox().ok_or(NetError::InboxTaken)?;
        let outbox = transport.outbox();

        let manager = Arc::new(TableManager::new(
            id.clone(),
            clock.clone(),
            router.clone(),
            outbox.clone(),
            shutdown_rx.clone(),
        ));

        tokio::spawn(dispatcher(
            inbox,
            router.clone(),
            waiters.clone(),
            clock.clone(),
            shutdown_rx,
        ));

        log::info!("node {id} started");
        Ok(Self {
            id,
            clock,
            router,
            manager,
            outbox,
            waiters,
            shutdown_tx,
        })
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn manager(&self) -> &TableManager {
        &self.manager
    }

    /// Stop every loop owned by this node (tables, dispatcher, transport).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Create a table with this node as authority and announce it.
    pub async fn create_table(&self, cfg: TableConfig) -> Result<TableId, ClusterError> {
        let id = TableId::generate();
        let handle = self
            .manager
            .create_local_authority_table(id.clone(), cfg)
            .await?;
        handle
            .propose(Action::new(
                ActionKind::CreateTable,
                PlayerId::from(&self.id),
            ))
            .await?;
        Ok(id)
    }

    /// Attach to a known table as a follower, ask the authority for a
    /// snapshot, and propose joining the game.
    pub async fn attach_table(
        &self,
        id: TableId,
        cfg: TableConfig,
        epoch: Epoch,
    ) -> Result<TableHandle, ClusterError> {
        let handle = self.manager.attach_follower_table(id.clone(), cfg, epoch).await?;
        self.broadcast_state_query(&id, epoch).await;
        handle
            .propose(Action::new(ActionKind::Join, PlayerId::from(&self.id)))
            .await?;
        Ok(handle)
    }

    /// Discover a table by id: broadcast a state query, wait for any
    /// authority's snapshot, attach as a follower with the snapshot's
    /// config and epoch, then propose joining.
    pub async fn discover_and_attach(&self, id: TableId) -> Result<TableHandle, ClusterError> {
        let receiver = {
            let mut waiters = self.waiters.lock().await;
            if waiters.contains_key(&id) {
                return Err(ClusterError::DiscoveryAlreadyInProgress);
            }
            let (tx, rx) = oneshot::channel();
            waiters.insert(id.clone(), tx);
            rx
        };

        self.broadcast_state_query(&id, 0).await;

        let msg = match tokio::time::timeout(DISCOVERY_TIMEOUT, receiver).await {
            Ok(Ok(msg)) => msg,
            _ => {
                self.waiters.lock().await.remove(&id);
                return Err(ClusterError::DiscoverTimeout);
            }
        };
        let Some(snapshot) = msg.state.clone() else {
            return Err(ClusterError::DiscoverTimeout);
        };

        let handle = self
            .manager
            .attach_follower_table(id.clone(), snapshot.cfg, snapshot.epoch)
            .await?;
        // Feed the snapshot through the normal install path so the new
        // replica starts from the authority's seq instead of zero.
        let _ = self.router.route(msg).await;
        handle
            .propose(Action::new(ActionKind::Join, PlayerId::from(&self.id)))
            .await?;
        Ok(handle)
    }

    async fn broadcast_state_query(&self, table: &TableId, epoch: Epoch) {
        let msg = NetMessage {
            table: table.clone(),
            from: self.id.clone(),
            kind: MsgType::StateQuery,
            epoch,
            lamport: self.clock.tick_local(),
            seq: 0,
            action: None,
            state: None,
        };
        if self.outbox.send(msg).await.is_err() {
            log::error!("node {}: transport outbox closed", self.id);
        }
    }
}

/// Drains the transport's inbound queue: merge the Lamport stamp, route to
/// the table's inbox, and hand unroutable snapshots to discovery waiters.
async fn dispatcher(
    mut inbox: mpsc::Receiver<NetMessage>,
    router: Arc<Router>,
    waiters: DiscoveryWaiters,
    clock: Arc<LamportClock>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = inbox.recv() => match maybe {
                Some(msg) => {
                    clock.tick_remote(msg.lamport);
                    if msg.kind == MsgType::Unknown {
                        log::debug!("dropping message with unknown type");
                        continue;
                    }
                    if let Some(unrouted) = router.route(msg).await {
                        deliver_to_waiter(&waiters, unrouted).await;
                    }
                }
                None => return,
            },
            _ = shutdown.changed() => return,
        }
    }
}

async fn deliver_to_waiter(waiters: &DiscoveryWaiters, msg: NetMessage) {
    if msg.kind != MsgType::Snapshot || msg.state.is_none() {
        return;
    }
    let waiter = waiters.lock().await.remove(&msg.table);
    if let Some(tx) = waiter {
        let _ = tx.send(msg);
    }
}
