//! Message contract and shared model for VoteChaos.
//!
//! - **Types** ([`Room`], [`RoomCode`], [`Identity`], [`Submission`], ...):
//!   the room record as persisted and as sent to clients.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   a closed set of tagged variants, one per event name.
//! - **Validation** ([`Validate`], [`Limits`]): required-field and bounds
//!   checks applied at the boundary, before anything reaches the engine.
//! - **Codec** ([`Codec`], [`JsonCodec`]): envelopes to and from JSON text.
//!
//! ```text
//! Transport (text frames) → Protocol (Envelope<ClientMessage>) → Engine
//! ```

mod codec;
mod error;
mod message;
mod types;
mod validate;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, ServerMessage};
pub use types::{
    Host, Identity, Participant, ROOM_CODE_LEN, Resolution, Room, RoomCode, RoomMode, RoomStatus,
    ScoreEntry, Submission, Tally, UserRef,
};
pub use validate::{
    Limits, Validate, validate_display_name, validate_options, validate_question,
    validate_round_seconds,
};
pub use votechaos_transport::ConnectionId;
