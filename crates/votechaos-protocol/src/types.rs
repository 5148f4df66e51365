//! The VoteChaos room model.
//!
//! Everything here is both persisted by the room store and sent to clients
//! inside [`ServerMessage`](crate::ServerMessage) payloads, so the serde
//! attributes define the wire shape: camelCase field names, lowercase enum
//! values, RFC 3339 timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use votechaos_transport::ConnectionId;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A short, human-typeable room identifier such as `K3ZQ9A`.
///
/// Codes are case-insensitive: [`RoomCode::parse`] uppercases its input, so
/// `"k3zq9a"` and `"K3ZQ9A"` name the same room. The only way to build a
/// `RoomCode` is through `parse` or `generate`, so a value of this type is
/// always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes and validates a client-supplied code.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ProtocolError::InvalidRoomCode(raw.to_owned()));
        }
        Ok(Self(code))
    }

    /// Draws a fresh code uniformly from `A-Z0-9`.
    ///
    /// Uniqueness is not checked here; the registry retries on collision.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a persistent user account (the login system's id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRef(String);

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a requester is, for authorization, duplicate detection and scoring.
///
/// A signed-in player is identified by their [`UserRef`] and keeps that
/// identity across reconnects. An anonymous player is identified by the
/// connection they are on. Display names are never used as keys.
///
/// JSON shape: `{"kind":"user","id":"u-1"}` or `{"kind":"connection","id":7}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Identity {
    User(UserRef),
    Connection(ConnectionId),
}

impl Identity {
    /// The identity of a requester on `connection_id`, signed in as `user_ref` if known.
    pub fn of(connection_id: ConnectionId, user_ref: Option<&UserRef>) -> Self {
        match user_ref {
            Some(user) => Self::User(user.clone()),
            None => Self::Connection(connection_id),
        }
    }

    pub fn user_ref(&self) -> Option<&UserRef> {
        match self {
            Self::User(user) => Some(user),
            Self::Connection(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user:{user}"),
            Self::Connection(conn) => write!(f, "{conn}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomMode / RoomStatus
// ---------------------------------------------------------------------------

/// The game a room plays. `Open` is reserved and rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Classic,
    Prediction,
    Open,
}

impl RoomMode {
    /// The status a room of this mode is in while its round runs.
    pub fn round_status(self) -> Option<RoomStatus> {
        match self {
            Self::Classic => Some(RoomStatus::Voting),
            Self::Prediction => Some(RoomStatus::Prediction),
            Self::Open => None,
        }
    }
}

impl fmt::Display for RoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => f.write_str("classic"),
            Self::Prediction => f.write_str("prediction"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// The lifecycle state of a room.
///
/// Transitions only move forward:
///
/// ```text
/// Waiting → Voting     → Finished    (classic)
/// Waiting → Prediction → Finished    (prediction)
/// ```
///
/// Rooms are usually created directly in their round status; `Waiting` is
/// used when the host asks to start the round later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Voting,
    Prediction,
    Finished,
}

impl RoomStatus {
    /// Returns `true` if the room still accepts participants.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Finished)
    }

    /// Returns `true` if moving from `self` to `target` is a legal step.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Voting)
                | (Self::Waiting, Self::Prediction)
                | (Self::Voting, Self::Finished)
                | (Self::Prediction, Self::Finished)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Voting => f.write_str("voting"),
            Self::Prediction => f.write_str("prediction"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Room parts
// ---------------------------------------------------------------------------

/// The room's host. Only the host may start, end or resolve a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub identity: Identity,
    pub display_name: String,
}

/// A player currently connected to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<UserRef>,
}

impl Participant {
    /// The key this participant's submissions and score are filed under.
    pub fn identity(&self) -> Identity {
        Identity::of(self.connection_id, self.user_ref.as_ref())
    }
}

/// One ledger entry: a vote (classic) or a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub display_name: String,
    pub chosen_option: String,
    pub submitted_at: DateTime<Utc>,
}

/// Cumulative prediction points for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub identity: Identity,
    pub display_name: String,
    pub points: u32,
}

/// Vote counts per option, in the room's option order.
pub type Tally = IndexMap<String, u32>;

/// The outcome of a finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Resolution {
    Classic {
        tally: Tally,
        winner: Option<String>,
        total_votes: u32,
    },
    Prediction {
        correct_option: String,
        winners: Vec<String>,
        scores: Vec<ScoreEntry>,
    },
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// The full persisted record of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: RoomCode,
    pub mode: RoomMode,
    pub host: Host,
    pub question: String,
    pub options: Vec<String>,
    pub status: RoomStatus,
    pub participants: Vec<Participant>,
    /// Length of a classic round. `None` for prediction rooms.
    #[serde(default)]
    pub round_seconds: Option<u64>,
    /// Deadline of the running classic round.
    #[serde(default)]
    pub timer_end_at: Option<DateTime<Utc>>,
    pub submissions: Vec<Submission>,
    /// Points carried across prediction rounds.
    #[serde(default)]
    pub scores: Vec<ScoreEntry>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    /// Returns `true` if the connection or the identity already has a
    /// submission in the ledger.
    pub fn has_submitted(&self, connection_id: ConnectionId, identity: &Identity) -> bool {
        self.submissions
            .iter()
            .any(|s| s.connection_id == connection_id || &s.identity == identity)
    }

    pub fn is_host(&self, identity: &Identity) -> bool {
        &self.host.identity == identity
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Whole seconds left on the round clock, rounded down and floored at
    /// zero.
    pub fn remaining_round_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.timer_end_at {
            Some(end) => {
                let millis = (end - now).num_milliseconds();
                if millis <= 0 {
                    0
                } else {
                    millis as u64 / 1000
                }
            }
            None => 0,
        }
    }

    /// Returns `true` if `user_ref` hosts, joined, or submitted to this room.
    pub fn involves(&self, user_ref: &UserRef) -> bool {
        self.host.identity.user_ref() == Some(user_ref)
            || self
                .participants
                .iter()
                .any(|p| p.user_ref.as_ref() == Some(user_ref))
            || self
                .submissions
                .iter()
                .any(|s| s.identity.user_ref() == Some(user_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_room() -> Room {
        let now = Utc::now();
        Room {
            code: RoomCode::parse("ABC123").unwrap(),
            mode: RoomMode::Classic,
            host: Host {
                identity: Identity::User(UserRef::new("host-1")),
                display_name: "Hosty".into(),
            },
            question: "Tabs or spaces?".into(),
            options: vec!["Tabs".into(), "Spaces".into()],
            status: RoomStatus::Voting,
            participants: vec![Participant {
                connection_id: ConnectionId::new(1),
                display_name: "alice".into(),
                user_ref: Some(UserRef::new("u-alice")),
            }],
            round_seconds: Some(30),
            timer_end_at: Some(now + Duration::seconds(30)),
            submissions: vec![Submission {
                connection_id: ConnectionId::new(1),
                identity: Identity::User(UserRef::new("u-alice")),
                display_name: "alice".into(),
                chosen_option: "Tabs".into(),
                submitted_at: now,
            }],
            scores: vec![],
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    // =====================================================================
    // RoomCode
    // =====================================================================

    #[test]
    fn test_room_code_parse_uppercases_and_trims() {
        let code = RoomCode::parse("  ab12cd ").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn test_room_code_parse_rejects_wrong_length() {
        assert!(matches!(
            RoomCode::parse("ABC"),
            Err(ProtocolError::InvalidRoomCode(_))
        ));
        assert!(RoomCode::parse("ABCDEFG").is_err());
    }

    #[test]
    fn test_room_code_parse_rejects_non_alphanumeric() {
        assert!(RoomCode::parse("AB-12C").is_err());
        assert!(RoomCode::parse("ÄBC123").is_err());
    }

    #[test]
    fn test_room_code_generate_is_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = RoomCode::generate(&mut rng);
            assert_eq!(RoomCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn test_room_code_deserialize_normalizes() {
        let code: RoomCode = serde_json::from_str("\"xyz789\"").unwrap();
        assert_eq!(code.to_string(), "XYZ789");
        assert!(serde_json::from_str::<RoomCode>("\"nope\"").is_err());
    }

    // =====================================================================
    // Identity
    // =====================================================================

    #[test]
    fn test_identity_of_prefers_user_ref() {
        let user = UserRef::new("u-1");
        assert_eq!(
            Identity::of(ConnectionId::new(3), Some(&user)),
            Identity::User(user)
        );
        assert_eq!(
            Identity::of(ConnectionId::new(3), None),
            Identity::Connection(ConnectionId::new(3))
        );
    }

    #[test]
    fn test_identity_json_shape() {
        let json = serde_json::to_value(Identity::User(UserRef::new("u-1"))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "user", "id": "u-1"}));

        let json = serde_json::to_value(Identity::Connection(ConnectionId::new(9))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "connection", "id": 9}));
    }

    // =====================================================================
    // RoomStatus
    // =====================================================================

    #[test]
    fn test_room_status_transitions_only_forward() {
        use RoomStatus::*;
        assert!(Waiting.can_transition_to(Voting));
        assert!(Waiting.can_transition_to(Prediction));
        assert!(Voting.can_transition_to(Finished));
        assert!(Prediction.can_transition_to(Finished));

        assert!(!Voting.can_transition_to(Waiting));
        assert!(!Finished.can_transition_to(Voting));
        assert!(!Voting.can_transition_to(Prediction));
        assert!(!Waiting.can_transition_to(Finished));
    }

    #[test]
    fn test_room_status_predicates() {
        assert!(RoomStatus::Waiting.is_open());
        assert!(RoomStatus::Voting.is_open());
        assert!(!RoomStatus::Finished.is_open());
    }

    #[test]
    fn test_room_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RoomStatus::Voting).unwrap(), "\"voting\"");
        assert_eq!(RoomStatus::Finished.to_string(), "finished");
    }

    #[test]
    fn test_room_mode_round_status() {
        assert_eq!(RoomMode::Classic.round_status(), Some(RoomStatus::Voting));
        assert_eq!(RoomMode::Prediction.round_status(), Some(RoomStatus::Prediction));
        assert_eq!(RoomMode::Open.round_status(), None);
    }

    // =====================================================================
    // Room helpers
    // =====================================================================

    #[test]
    fn test_room_has_submitted_by_connection_or_identity() {
        let room = sample_room();
        let alice = Identity::User(UserRef::new("u-alice"));
        assert!(room.has_submitted(ConnectionId::new(1), &Identity::Connection(ConnectionId::new(1))));
        // Same user on a fresh connection.
        assert!(room.has_submitted(ConnectionId::new(99), &alice));
        assert!(!room.has_submitted(
            ConnectionId::new(2),
            &Identity::Connection(ConnectionId::new(2))
        ));
    }

    #[test]
    fn test_room_remaining_round_seconds_rounds_down() {
        let room = sample_room();
        let end = room.timer_end_at.unwrap();
        assert_eq!(room.remaining_round_seconds(end - Duration::milliseconds(2400)), 2);
        assert_eq!(room.remaining_round_seconds(end - Duration::milliseconds(999)), 0);
        assert_eq!(room.remaining_round_seconds(end), 0);
        assert_eq!(room.remaining_round_seconds(end + Duration::seconds(5)), 0);
    }

    #[test]
    fn test_room_involves_host_participant_and_submitter() {
        let room = sample_room();
        assert!(room.involves(&UserRef::new("host-1")));
        assert!(room.involves(&UserRef::new("u-alice")));
        assert!(!room.involves(&UserRef::new("stranger")));
    }

    #[test]
    fn test_room_serializes_camel_case() {
        let json = serde_json::to_value(sample_room()).unwrap();
        assert_eq!(json["code"], "ABC123");
        assert_eq!(json["status"], "voting");
        assert_eq!(json["roundSeconds"], 30);
        assert!(json["timerEndAt"].is_string());
        assert_eq!(json["participants"][0]["connectionId"], 1);
        assert_eq!(json["submissions"][0]["chosenOption"], "Tabs");
    }

    #[test]
    fn test_resolution_classic_json_shape() {
        let mut tally = Tally::new();
        tally.insert("Tabs".into(), 2);
        tally.insert("Spaces".into(), 0);
        let json = serde_json::to_value(Resolution::Classic {
            tally,
            winner: Some("Tabs".into()),
            total_votes: 2,
        })
        .unwrap();
        assert_eq!(json["mode"], "classic");
        assert_eq!(json["totalVotes"], 2);
        assert_eq!(json["tally"], serde_json::json!({"Tabs": 2, "Spaces": 0}));
    }
}
