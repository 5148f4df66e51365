//! Transport layer for VoteChaos.
//!
//! Accepts client sockets and hands the server one [`WebSocketConnection`]
//! per client. A connection is split into a [`WebSocketSender`] (owned by
//! the connection's single writer task) and a [`WebSocketReceiver`] (owned
//! by the read loop), so outbound broadcasts never wait on an inbound read.
//!
//! Every accepted socket gets a process-unique [`ConnectionId`]. The game
//! engine uses it as the participant key for a room.

#![allow(async_fn_in_trait)]

mod error;
mod websocket;

pub use error::TransportError;
pub use websocket::{WebSocketConnection, WebSocketReceiver, WebSocketSender, WebSocketTransport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a client connection.
///
/// Serializes as a plain number so clients can echo it back
/// (`submitVote{connectionId}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Send + 'static;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    /// The local address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}
