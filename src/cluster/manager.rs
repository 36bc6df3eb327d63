//! Table manager: spawns and tracks the per-table replicas.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};

use super::node::ClusterError;
use super::router::Router;
use crate::protocol::{Epoch, LamportClock, NetMessage, NodeId, TableId};
use crate::table::replica::INBOX_CAPACITY;
use crate::table::{TableConfig, TableHandle, TableReplica};

/// Per-table listing for shells and debugging.
#[derive(Clone, Debug)]
pub struct TableListing {
    pub id: TableId,
    pub epoch: Epoch,
    pub authority: Option<NodeId>,
    pub is_authority: bool,
}

/// Owns the `table_id -> replica` mapping and creates per-table inboxes.
pub struct TableManager {
    self_id: NodeId,
    clock: Arc<LamportClock>,
    router: Arc<Router>,
    outbox: mpsc::Sender<NetMessage>,
    shutdown: watch::Receiver<bool>,
    tables: RwLock<HashMap<TableId, TableHandle>>,
}

impl TableManager {
    pub fn new(
        self_id: NodeId,
        clock: Arc<LamportClock>,
        router: Arc<Router>,
        outbox: mpsc::Sender<NetMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            self_id,
            clock,
            router,
            outbox,
            shutdown,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Create and spawn a table with the local node as authority, epoch 0.
    pub async fn create_local_authority_table(
        &self,
        id: TableId,
        cfg: TableConfig,
    ) -> Result<TableHandle, ClusterError> {
        cfg.validate().map_err(ClusterError::InvalidConfig)?;
        self.spawn_replica(id, cfg, true, 0).await
    }

    /// Create and spawn a follower replica with a known config and epoch.
    pub async fn attach_follower_table(
        &self,
        id: TableId,
        cfg: TableConfig,
        epoch: Epoch,
    ) -> Result<TableHandle, ClusterError> {
        self.spawn_replica(id, cfg, false, epoch).await
    }

    async fn spawn_replica(
        &self,
        id: TableId,
        cfg: TableConfig,
        is_authority: bool,
        epoch: Epoch,
    ) -> Result<TableHandle, ClusterError> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&id) {
            return Err(ClusterError::TableExists);
        }
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (replica, handle) = TableReplica::new(
            id.clone(),
            self.self_id.clone(),
            cfg,
            is_authority,
            epoch,
            self.clock.clone(),
            inbox_rx,
            self.outbox.clone(),
            self.shutdown.clone(),
        );
        tables.insert(id.clone(), handle.clone());
        drop(tables);

        self.router.register(id.clone(), inbox_tx).await;
        tokio::spawn(replica.run());
        log::info!("spawned table {id} (authority={is_authority}, epoch={epoch})");
        Ok(handle)
    }

    /// Look up a table's handle.
    pub async fn get_table(&self, id: &TableId) -> Option<TableHandle> {
        self.tables.read().await.get(id).cloned()
    }

    /// Locally known table ids, sorted.
    pub async fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Per-table epoch/authority listings, sorted by id. Tables whose
    /// replica has already stopped are skipped.
    pub async fn list_tables(&self) -> Vec<TableListing> {
        let handles: Vec<TableHandle> = self.tables.read().await.values().cloned().collect();
        let mut listings = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(summary) = handle.summary().await {
                listings.push(TableListing {
                    id: summary.id,
                    epoch: summary.epoch,
                    authority: summary.authority,
                    is_authority: summary.is_authority,
                });
            }
        }
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        listings
    }

    /// Number of tables this node participates in.
    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }
}
