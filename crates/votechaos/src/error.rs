//! Unified error type for the VoteChaos server.

use votechaos_protocol::ProtocolError;
use votechaos_room::EngineError;
use votechaos_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum VoteChaosError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An engine-level error (room lifecycle, persistence).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Invalid server configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
