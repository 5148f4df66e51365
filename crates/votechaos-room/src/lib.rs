//! Room lifecycle engine for VoteChaos.
//!
//! Each room runs as an isolated Tokio task (actor model). All mutations
//! of one room, round expiry included, go through its actor's queue.
//!
//! # Key types
//!
//! - [`RoomManager`]: entry point for every room operation
//! - [`RoomRegistry`]: code allocation and store access
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomStore`] / [`MemoryStore`]: the persistence hook
//! - [`Broadcaster`]: the delivery hook for server events
//! - [`resolve_classic`] / [`resolve_prediction`]: round outcomes
//! - [`EngineConfig`]: defaults and limits

#![allow(async_fn_in_trait)]

mod broadcast;
mod config;
mod error;
mod ledger;
mod manager;
mod registry;
mod resolver;
mod room;
mod store;

pub use broadcast::Broadcaster;
pub use config::EngineConfig;
pub use error::EngineError;
pub use ledger::{SubmissionKind, check_submission, record};
pub use manager::{Requester, RoomManager};
pub use registry::{ACTIVE_STATUSES, NewRoom, RoomRegistry};
pub use resolver::{ClassicOutcome, PredictionOutcome, resolve_classic, resolve_prediction};
pub use room::RoomHandle;
pub use store::{MemoryStore, RoomStore, StoreError};
