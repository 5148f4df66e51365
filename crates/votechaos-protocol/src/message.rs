//! Client and server message sum types.
//!
//! One variant per event name. Payloads are internally tagged, so a vote
//! looks like:
//!
//! ```json
//! {"seq":3,"payload":{"type":"submitVote","roomCode":"K3ZQ9A","chosenOption":"Yes"}}
//! ```
//!
//! Unknown `type` tags and missing required fields fail to decode. The
//! server answers those with a `PARSE_ERROR` instead of passing anything
//! half-formed to the engine.

use serde::{Deserialize, Serialize};
use votechaos_transport::ConnectionId;

use crate::types::{Participant, Room, RoomCode, RoomMode, RoomStatus, ScoreEntry, Submission, Tally, UserRef};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level frame. Every text frame on the socket is one envelope.
///
/// The server stamps `seq` (per connection, starting at 1) and `timestamp`
/// (Unix milliseconds) on everything it sends. Clients may omit both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub timestamp: u64,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Everything a client may ask of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // -- Room membership --
    JoinRoom {
        room_code: RoomCode,
        display_name: String,
        #[serde(default)]
        persistent_user_ref: Option<UserRef>,
    },

    LeaveRoom {
        room_code: RoomCode,
    },

    // -- Submissions --
    /// `connection_id`, when present, must match the sending connection.
    SubmitVote {
        room_code: RoomCode,
        #[serde(default)]
        connection_id: Option<ConnectionId>,
        chosen_option: String,
    },

    SubmitPrediction {
        room_code: RoomCode,
        chosen_option: String,
        #[serde(default)]
        persistent_user_ref: Option<UserRef>,
    },

    // -- Host actions --
    StartRound {
        room_code: RoomCode,
    },

    EndRound {
        room_code: RoomCode,
    },

    EndPrediction {
        room_code: RoomCode,
        correct_option: String,
    },

    // -- Queries --
    /// Creates a room hosted by the sender. `start_immediately` defaults to
    /// `true`; `false` leaves the room `waiting` until `startRound`.
    CreateRoom {
        mode: RoomMode,
        question: String,
        options: Vec<String>,
        #[serde(default)]
        timer_seconds: Option<u64>,
        host_name: String,
        #[serde(default)]
        persistent_user_ref: Option<UserRef>,
        #[serde(default)]
        start_immediately: Option<bool>,
    },

    GetRoom {
        room_code: RoomCode,
    },

    ListActiveRooms {
        user_ref: UserRef,
    },

    ListFinishedRooms {
        user_ref: UserRef,
    },

    // -- Keep-alive --
    Heartbeat {
        client_time: u64,
    },
}

impl ClientMessage {
    /// The event name, as it appears in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "joinRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::SubmitVote { .. } => "submitVote",
            Self::SubmitPrediction { .. } => "submitPrediction",
            Self::StartRound { .. } => "startRound",
            Self::EndRound { .. } => "endRound",
            Self::EndPrediction { .. } => "endPrediction",
            Self::CreateRoom { .. } => "createRoom",
            Self::GetRoom { .. } => "getRoom",
            Self::ListActiveRooms { .. } => "listActiveRooms",
            Self::ListFinishedRooms { .. } => "listFinishedRooms",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Everything the server may push to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent to a connection right after it joins a room.
    PlayerInfo {
        connection_id: ConnectionId,
    },

    RoomUpdate {
        room_code: RoomCode,
        participants: Vec<Participant>,
    },

    /// A classic round is running. Late joiners get this with the time left.
    GameStarted {
        room_code: RoomCode,
        question: String,
        options: Vec<String>,
        round_time_seconds: u64,
    },

    RoundEnded {
        room_code: RoomCode,
        question: String,
        submissions: Vec<Submission>,
        tally: Tally,
        winner: Option<String>,
        total_votes: u32,
    },

    PredictionStarted {
        room_code: RoomCode,
        question: String,
        options: Vec<String>,
    },

    PredictionEnded {
        room_code: RoomCode,
        question: String,
        correct_option: String,
        winners: Vec<String>,
        scores: Vec<ScoreEntry>,
    },

    /// The sender's vote or prediction was recorded.
    SubmissionAccepted {
        room_code: RoomCode,
        chosen_option: String,
    },

    ErrorMessage {
        code: String,
        reason: String,
    },

    /// Pushed to every connection whenever any room changes status.
    GameStatusUpdate {
        room_code: RoomCode,
        status: RoomStatus,
    },

    RoomCreated {
        room: Room,
    },

    RoomDetails {
        room: Room,
    },

    RoomList {
        rooms: Vec<Room>,
    },

    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ErrorMessage {
            code: code.into(),
            reason: reason.into(),
        }
    }
}
