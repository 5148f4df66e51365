//! # VoteChaos
//!
//! Real-time multiplayer voting game server.
//!
//! A host creates a room with a question and a fixed set of options. In
//! classic rooms participants vote against a round timer and the most voted
//! option wins. In prediction rooms participants commit to an option and
//! score a point when the host later reveals it as correct.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use votechaos::prelude::*;
//!
//! # async fn run() -> Result<(), VoteChaosError> {
//! let server = VoteChaosServerBuilder::new()
//!     .bind("0.0.0.0:5000")
//!     .build(MemoryStore::new(), TrustingVerifier)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod gateway;
mod handler;
mod identity;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::VoteChaosError;
pub use gateway::{Gateway, Outbox};
pub use identity::{IdentityError, IdentityVerifier, TrustingVerifier};
pub use server::{VoteChaosServer, VoteChaosServerBuilder};

/// Everything needed to run a server and talk to it.
pub mod prelude {
    pub use crate::{
        ConfigError, Gateway, IdentityError, IdentityVerifier, ServerConfig, TrustingVerifier,
        VoteChaosError, VoteChaosServer, VoteChaosServerBuilder,
    };
    pub use votechaos_protocol::{
        ClientMessage, ConnectionId, Envelope, Participant, Room, RoomCode, RoomMode, RoomStatus,
        ScoreEntry, ServerMessage, Submission, UserRef,
    };
    pub use votechaos_room::{EngineConfig, EngineError, MemoryStore, RoomStore, StoreError};
}
