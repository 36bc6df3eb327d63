//! Demultiplexes inbound envelopes to per-table inboxes.

use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};

use crate::protocol::{NetMessage, TableId};

/// Table-id keyed routing map.
///
/// Lookups clone the inbox sender under a read lock and release it before
/// sending, so the lock is never held across a blocking channel send. The
/// bounded inbox send is the back-pressure point toward the dispatcher.
#[derive(Debug, Default)]
pub struct Router {
    routes: RwLock<HashMap<TableId, mpsc::Sender<NetMessage>>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's inbox.
    pub async fn register(&self, id: TableId, inbox: mpsc::Sender<NetMessage>) {
        self.routes.write().await.insert(id, inbox);
    }

    /// Remove a table's route.
    pub async fn unregister(&self, id: &TableId) {
        self.routes.write().await.remove(id);
    }

    /// Deliver `msg` to its table's inbox. Returns the message back when no
    /// table is registered for it, so the caller can feed discovery.
    pub async fn route(&self, msg: NetMessage) -> Option<NetMessage> {
        let inbox = {
            let routes = self.routes.read().await;
            routes.get(&msg.table).cloned()
        };
        match inbox {
            Some(inbox) => {
                if let Err(send_error) = inbox.send(msg).await {
                    // Replica gone but not yet unregistered; treat as unroutable.
                    return Some(send_error.0);
                }
                None
            }
            None => Some(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MsgType, NodeId};

    fn message(table: &str) -> NetMessage {
        NetMessage {
            table: TableId::from(table),
            from: NodeId::from("n-1"),
            kind: MsgType::Heartbeat,
            epoch: 0,
            lamport: 1,
            seq: 0,
            action: None,
            state: None,
        }
    }

    #[tokio::test]
    async fn routes_to_registered_inbox() {
        let router = Router::new();
        let (tx, mut rx) = mpsc::channel(4);
        router.register(TableId::from("t-1"), tx).await;

        assert!(router.route(message("t-1")).await.is_none());
        assert_eq!(rx.recv().await.unwrap().table, TableId::from("t-1"));
    }

    #[tokio::test]
    async fn unknown_table_returns_message() {
        let router = Router::new();
        let returned = router.route(message("t-missing")).await;
        assert!(returned.is_some());
    }

    #[tokio::test]
    async fn unregister_removes_route() {
        let router = Router::new();
        let (tx, _rx) = mpsc::channel(4);
        router.register(TableId::from("t-1"), tx).await;
        router.unregister(&TableId::from("t-1")).await;
        assert!(router.route(message("t-1")).await.is_some());
    }

    #[tokio::test]
    async fn dead_inbox_counts_as_unroutable() {
        let router = Router::new();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        router.register(TableId::from("t-1"), tx).await;
        assert!(router.route(message("t-1")).await.is_some());
    }
}
