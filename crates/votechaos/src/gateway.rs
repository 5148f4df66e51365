//! Delivers engine events to connected sockets.
//!
//! Each registered connection owns an unbounded outbox drained by its
//! writer task, so messages to one connection keep their order no matter
//! which room actor or handler produced them. The gateway also keeps the
//! room → connections index that `to_room` fans out over.

use std::collections::{HashMap, HashSet};

use tokio::sync::{Mutex, mpsc};
use votechaos_protocol::{ConnectionId, RoomCode, ServerMessage};
use votechaos_room::Broadcaster;

pub type Outbox = mpsc::UnboundedReceiver<ServerMessage>;

#[derive(Default)]
pub struct Gateway {
    connections: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
    rooms: Mutex<HashMap<RoomCode, HashSet<ConnectionId>>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the receiving end of its outbox.
    pub async fn register(&self, connection_id: ConnectionId) -> Outbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().await.insert(connection_id, tx);
        rx
    }

    /// Drops the connection's outbox and every room subscription it had.
    /// The writer task ends once the outbox drains.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        self.connections.lock().await.remove(&connection_id);
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn subscriber_count(&self, code: &RoomCode) -> usize {
        self.rooms.lock().await.get(code).map_or(0, HashSet::len)
    }

    async fn send(&self, connection_id: ConnectionId, msg: ServerMessage) {
        let connections = self.connections.lock().await;
        if let Some(tx) = connections.get(&connection_id) {
            if tx.send(msg).is_err() {
                tracing::debug!(%connection_id, "outbox closed, message dropped");
            }
        }
    }
}

impl Broadcaster for Gateway {
    async fn subscribe(&self, code: &RoomCode, connection_id: ConnectionId) {
        self.rooms
            .lock()
            .await
            .entry(code.clone())
            .or_default()
            .insert(connection_id);
    }

    async fn unsubscribe(&self, code: &RoomCode, connection_id: ConnectionId) {
        let mut rooms = self.rooms.lock().await;
        if let Some(members) = rooms.get_mut(code) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(code);
            }
        }
    }

    async fn to_room(&self, code: &RoomCode, msg: ServerMessage) {
        let members: Vec<ConnectionId> = match self.rooms.lock().await.get(code) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        let connections = self.connections.lock().await;
        for connection_id in members {
            if let Some(tx) = connections.get(&connection_id) {
                let _ = tx.send(msg.clone());
            }
        }
    }

    async fn to_connection(&self, connection_id: ConnectionId, msg: ServerMessage) {
        self.send(connection_id, msg).await;
    }

    async fn to_everyone(&self, msg: ServerMessage) {
        let connections = self.connections.lock().await;
        for tx in connections.values() {
            let _ = tx.send(msg.clone());
        }
    }
}
