//! Persistence hook for room records.
//!
//! The store is the single source of truth. Room actors never cache a
//! [`Room`] between commands: every command loads the current record,
//! checks its preconditions, and writes back through one of the guarded
//! operations below. The guards (`expected` status on [`RoomStore::save`]
//! and [`RoomStore::append_submission`]) make a write fail instead of
//! clobbering a transition made by some other writer.

use std::collections::HashMap;
use std::future::Future;

use chrono::Utc;
use tokio::sync::RwLock;
use votechaos_protocol::{
    ConnectionId, Identity, Participant, Room, RoomCode, RoomStatus, Submission, UserRef,
};

/// Errors reported by a [`RoomStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// `insert` found an existing room under this code.
    #[error("room code {0} already taken")]
    CodeTaken(RoomCode),

    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room is finished and no longer accepts participants.
    #[error("room {0} is closed")]
    Closed(RoomCode),

    /// A guarded write found the room in a different status.
    #[error("room {code} is {found}, expected {expected}")]
    Conflict {
        code: RoomCode,
        expected: RoomStatus,
        found: RoomStatus,
    },

    #[error("{identity} already submitted in room {code}")]
    DuplicateSubmission { code: RoomCode, identity: Identity },
}

/// Durable storage for room records.
///
/// Implementations must apply each operation atomically with respect to
/// the others on the same room.
pub trait RoomStore: Send + Sync + 'static {
    /// Stores a new room. Fails with [`StoreError::CodeTaken`] on a code collision.
    fn insert(&self, room: Room) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load(&self, code: &RoomCode) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Replaces the record if it is still in `expected` status.
    fn save(
        &self,
        room: &Room,
        expected: RoomStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds a participant unless one with the same connection id exists.
    /// Fails with [`StoreError::Closed`] on finished rooms.
    fn add_participant(
        &self,
        code: &RoomCode,
        participant: Participant,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Removes a participant if present.
    fn remove_participant(
        &self,
        code: &RoomCode,
        connection_id: ConnectionId,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Appends to the ledger if the room is in `expected` status and neither
    /// the submission's connection nor its identity has submitted yet.
    fn append_submission(
        &self,
        code: &RoomCode,
        expected: RoomStatus,
        submission: Submission,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Rooms in one of `statuses` that `user_ref` hosts, joined or
    /// submitted to, newest first.
    fn list_for_user(
        &self,
        user_ref: &UserRef,
        statuses: &[RoomStatus],
    ) -> impl Future<Output = Result<Vec<Room>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process [`RoomStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<RoomCode, Room>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

impl RoomStore for MemoryStore {
    async fn insert(&self, room: Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.code) {
            return Err(StoreError::CodeTaken(room.code));
        }
        rooms.insert(room.code.clone(), room);
        Ok(())
    }

    async fn load(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.read().await.get(code).cloned())
    }

    async fn save(&self, room: &Room, expected: RoomStatus) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let current = rooms
            .get_mut(&room.code)
            .ok_or_else(|| StoreError::NotFound(room.code.clone()))?;
        if current.status != expected {
            return Err(StoreError::Conflict {
                code: room.code.clone(),
                expected,
                found: current.status,
            });
        }
        *current = room.clone();
        Ok(())
    }

    async fn add_participant(
        &self,
        code: &RoomCode,
        participant: Participant,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;
        if !room.status.is_open() {
            return Err(StoreError::Closed(code.clone()));
        }
        if room.participant(participant.connection_id).is_none() {
            room.participants.push(participant);
            room.updated_at = Utc::now();
        }
        Ok(room.clone())
    }

    async fn remove_participant(
        &self,
        code: &RoomCode,
        connection_id: ConnectionId,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;
        let before = room.participants.len();
        room.participants.retain(|p| p.connection_id != connection_id);
        if room.participants.len() != before {
            room.updated_at = Utc::now();
        }
        Ok(room.clone())
    }

    async fn append_submission(
        &self,
        code: &RoomCode,
        expected: RoomStatus,
        submission: Submission,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.clone()))?;
        if room.status != expected {
            return Err(StoreError::Conflict {
                code: code.clone(),
                expected,
                found: room.status,
            });
        }
        if room.has_submitted(submission.connection_id, &submission.identity) {
            return Err(StoreError::DuplicateSubmission {
                code: code.clone(),
                identity: submission.identity,
            });
        }
        room.submissions.push(submission);
        room.updated_at = Utc::now();
        Ok(room.clone())
    }

    async fn list_for_user(
        &self,
        user_ref: &UserRef,
        statuses: &[RoomStatus],
    ) -> Result<Vec<Room>, StoreError> {
        let rooms = self.rooms.read().await;
        let mut matching: Vec<Room> = rooms
            .values()
            .filter(|room| statuses.contains(&room.status) && room.involves(user_ref))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use votechaos_protocol::{Host, RoomMode};

    fn room(code: &str, status: RoomStatus) -> Room {
        let now = Utc::now();
        Room {
            code: RoomCode::parse(code).unwrap(),
            mode: RoomMode::Classic,
            host: Host {
                identity: Identity::User(UserRef::new("host")),
                display_name: "host".into(),
            },
            question: "Q?".into(),
            options: vec!["A".into(), "B".into()],
            status,
            participants: vec![],
            round_seconds: Some(30),
            timer_end_at: None,
            submissions: vec![],
            scores: vec![],
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn participant(id: u64) -> Participant {
        Participant {
            connection_id: ConnectionId::new(id),
            display_name: format!("p{id}"),
            user_ref: None,
        }
    }

    fn submission(id: u64, option: &str) -> Submission {
        Submission {
            connection_id: ConnectionId::new(id),
            identity: Identity::Connection(ConnectionId::new(id)),
            display_name: format!("p{id}"),
            chosen_option: option.into(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_code() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Voting)).await.unwrap();
        let err = store
            .insert(room("AAAAAA", RoomStatus::Voting))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CodeTaken(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_rejects_status_conflict() {
        let store = MemoryStore::new();
        let mut r = room("AAAAAA", RoomStatus::Voting);
        store.insert(r.clone()).await.unwrap();

        r.status = RoomStatus::Finished;
        store.save(&r, RoomStatus::Voting).await.unwrap();

        let err = store.save(&r, RoomStatus::Voting).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                found: RoomStatus::Finished,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_add_participant_is_idempotent() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Voting)).await.unwrap();
        let code = RoomCode::parse("AAAAAA").unwrap();

        store.add_participant(&code, participant(1)).await.unwrap();
        let r = store.add_participant(&code, participant(1)).await.unwrap();
        assert_eq!(r.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_add_participant_rejects_finished_room() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Finished)).await.unwrap();
        let code = RoomCode::parse("AAAAAA").unwrap();

        let err = store.add_participant(&code, participant(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed(_)));
    }

    #[tokio::test]
    async fn test_remove_participant_is_idempotent() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Voting)).await.unwrap();
        let code = RoomCode::parse("AAAAAA").unwrap();
        store.add_participant(&code, participant(1)).await.unwrap();

        let r = store.remove_participant(&code, ConnectionId::new(1)).await.unwrap();
        assert!(r.participants.is_empty());
        let r = store.remove_participant(&code, ConnectionId::new(1)).await.unwrap();
        assert!(r.participants.is_empty());
    }

    #[tokio::test]
    async fn test_append_submission_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Voting)).await.unwrap();
        let code = RoomCode::parse("AAAAAA").unwrap();

        store
            .append_submission(&code, RoomStatus::Voting, submission(1, "A"))
            .await
            .unwrap();
        let err = store
            .append_submission(&code, RoomStatus::Voting, submission(1, "B"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSubmission { .. }));

        let stored = store.load(&code).await.unwrap().unwrap();
        assert_eq!(stored.submissions.len(), 1);
        assert_eq!(stored.submissions[0].chosen_option, "A");
    }

    #[tokio::test]
    async fn test_append_submission_rejects_wrong_status() {
        let store = MemoryStore::new();
        store.insert(room("AAAAAA", RoomStatus::Finished)).await.unwrap();
        let code = RoomCode::parse("AAAAAA").unwrap();

        let err = store
            .append_submission(&code, RoomStatus::Voting, submission(1, "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_for_user_filters_and_sorts_newest_first() {
        let store = MemoryStore::new();
        let mut older = room("OLDER1", RoomStatus::Voting);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = room("NEWER1", RoomStatus::Prediction);
        let done = room("DONE01", RoomStatus::Finished);
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();
        store.insert(done).await.unwrap();

        let active = store
            .list_for_user(
                &UserRef::new("host"),
                &[RoomStatus::Waiting, RoomStatus::Voting, RoomStatus::Prediction],
            )
            .await
            .unwrap();
        let codes: Vec<&str> = active.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["NEWER1", "OLDER1"]);

        let none = store
            .list_for_user(&UserRef::new("nobody"), &[RoomStatus::Finished])
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
