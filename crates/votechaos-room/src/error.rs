//! Error types for the engine.

use votechaos_protocol::{ConnectionId, Identity, ProtocolError, RoomCode, RoomStatus};

use crate::StoreError;

/// Errors returned by engine operations.
///
/// Every variant has a stable wire code (see [`EngineError::code`]) that the
/// server sends to the client in `errorMessage{code, reason}`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A malformed create or submit request.
    #[error("validation failed: {0}")]
    Validation(#[from] ProtocolError),

    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// The room is finished and accepts no further operations.
    #[error("room {0} is finished")]
    RoomClosed(RoomCode),

    #[error("{identity} already submitted in room {code}")]
    DuplicateSubmission { code: RoomCode, identity: Identity },

    #[error("{option:?} is not an option in room {code}")]
    InvalidOption { code: RoomCode, option: String },

    /// The room is not in the status this operation requires.
    #[error("room {code} is {found}, expected {expected}")]
    RoundNotActive {
        code: RoomCode,
        expected: RoomStatus,
        found: RoomStatus,
    },

    /// A host-only action attempted by someone else.
    #[error("{identity} is not the host of room {code}")]
    Unauthorized { code: RoomCode, identity: Identity },

    #[error("{connection_id} is not in room {code}")]
    NotInRoom {
        code: RoomCode,
        connection_id: ConnectionId,
    },

    /// The store failed; the transition was not applied.
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),

    /// The room's actor is not accepting commands.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl EngineError {
    /// The stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::RoomClosed(_) => "ROOM_CLOSED",
            Self::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            Self::InvalidOption { .. } => "INVALID_OPTION",
            Self::RoundNotActive { .. } => "ROUND_NOT_ACTIVE",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotInRoom { .. } => "NOT_IN_ROOM",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
            Self::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

/// Store rejections that carry domain meaning map to their engine
/// counterparts; the rest are persistence failures.
impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(code) => Self::RoomNotFound(code),
            StoreError::Closed(code) => Self::RoomClosed(code),
            StoreError::Conflict {
                code,
                found: RoomStatus::Finished,
                ..
            } => Self::RoomClosed(code),
            StoreError::Conflict {
                code,
                expected,
                found,
            } => Self::RoundNotActive {
                code,
                expected,
                found,
            },
            StoreError::DuplicateSubmission { code, identity } => {
                Self::DuplicateSubmission { code, identity }
            }
            other @ (StoreError::Unavailable(_) | StoreError::CodeTaken(_)) => {
                Self::Persistence(other)
            }
        }
    }
}
