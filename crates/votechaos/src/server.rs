//! `VoteChaosServer` builder and server loop.
//!
//! This is the entry point for running a VoteChaos server. It ties
//! together all the layers: transport → protocol → engine, with the
//! [`Gateway`] carrying engine events back out.

use std::sync::Arc;
use std::time::Duration;

use votechaos_protocol::{Codec, JsonCodec};
use votechaos_room::{EngineConfig, RoomManager, RoomStore};
use votechaos_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Gateway, IdentityVerifier, ServerConfig, VoteChaosError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S: RoomStore, V: IdentityVerifier, C: Codec> {
    pub(crate) engine: RoomManager<S, Gateway>,
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) verifier: V,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a VoteChaos server.
///
/// # Example
///
/// ```rust,no_run
/// use votechaos::prelude::*;
///
/// # async fn run() -> Result<(), VoteChaosError> {
/// let server = VoteChaosServerBuilder::new()
///     .bind("0.0.0.0:5000")
///     .build(MemoryStore::new(), TrustingVerifier)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct VoteChaosServerBuilder {
    config: ServerConfig,
}

impl VoteChaosServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting, e.g. with one read by [`ServerConfig::from_env`].
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn engine_config(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    /// Binds the listener and assembles the engine over `store`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<S, V>(
        self,
        store: S,
        verifier: V,
    ) -> Result<VoteChaosServer<S, V, JsonCodec>, VoteChaosError>
    where
        S: RoomStore,
        V: IdentityVerifier,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let gateway = Arc::new(Gateway::new());
        let engine = RoomManager::new(Arc::new(store), Arc::clone(&gateway), self.config.engine);

        let state = Arc::new(ServerState {
            engine,
            gateway,
            verifier,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(VoteChaosServer { transport, state })
    }
}

impl Default for VoteChaosServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound VoteChaos server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct VoteChaosServer<S: RoomStore, V: IdentityVerifier, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, V, C>>,
}

impl<S, V, C> VoteChaosServer<S, V, C>
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec + Clone + Send + Sync + 'static,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The engine behind this server. Clones share all room state.
    pub fn engine(&self) -> RoomManager<S, Gateway> {
        self.state.engine.clone()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated or the future is dropped.
    pub async fn run(mut self) -> Result<(), VoteChaosError> {
        tracing::info!(addr = ?self.local_addr().ok(), "VoteChaos server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let connection_id = conn.id();
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(%connection_id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
