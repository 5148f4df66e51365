//! Broadcast hook: how the engine reaches connected clients.

use std::future::Future;

use votechaos_protocol::{ConnectionId, RoomCode, ServerMessage};

/// Delivers engine events to connections.
///
/// The engine calls these from inside a room actor, after the transition
/// they describe has been durably saved. Delivery is best effort: a
/// connection that has gone away is silently skipped.
pub trait Broadcaster: Send + Sync + 'static {
    /// Starts delivering `code`'s room events to `connection_id`.
    fn subscribe(
        &self,
        code: &RoomCode,
        connection_id: ConnectionId,
    ) -> impl Future<Output = ()> + Send;

    fn unsubscribe(
        &self,
        code: &RoomCode,
        connection_id: ConnectionId,
    ) -> impl Future<Output = ()> + Send;

    /// Sends to every subscriber of `code`.
    fn to_room(&self, code: &RoomCode, msg: ServerMessage) -> impl Future<Output = ()> + Send;

    fn to_connection(
        &self,
        connection_id: ConnectionId,
        msg: ServerMessage,
    ) -> impl Future<Output = ()> + Send;

    /// Sends to every connection, in a room or not.
    fn to_everyone(&self, msg: ServerMessage) -> impl Future<Output = ()> + Send;
}
