//! The vote/prediction ledger.
//!
//! Submissions are append-only: a second submission from the same
//! connection or identity is rejected, never merged, and nothing here
//! removes or rewrites an entry.

use chrono::Utc;
use votechaos_protocol::{ConnectionId, Identity, Room, RoomStatus, Submission, UserRef};

use crate::{EngineError, RoomStore};

/// Which kind of round a submission is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Vote,
    Prediction,
}

impl SubmissionKind {
    /// The room status this kind of submission requires.
    pub fn required_status(self) -> RoomStatus {
        match self {
            Self::Vote => RoomStatus::Voting,
            Self::Prediction => RoomStatus::Prediction,
        }
    }
}

/// Checks a prospective submission against the current room.
///
/// In order: the room must not be finished (`RoomClosed`), the sender must
/// be a participant (`NotInRoom`), the status must match the kind
/// (`RoundNotActive`), the option must exist (`InvalidOption`), and neither
/// the connection nor the identity may have submitted (`DuplicateSubmission`).
///
/// Returns the ledger entry to append.
pub fn check_submission(
    room: &Room,
    kind: SubmissionKind,
    connection_id: ConnectionId,
    user_ref: Option<&UserRef>,
    chosen_option: &str,
) -> Result<Submission, EngineError> {
    if room.status == RoomStatus::Finished {
        return Err(EngineError::RoomClosed(room.code.clone()));
    }
    let participant = room
        .participant(connection_id)
        .ok_or_else(|| EngineError::NotInRoom {
            code: room.code.clone(),
            connection_id,
        })?;
    let expected = kind.required_status();
    if room.status != expected {
        return Err(EngineError::RoundNotActive {
            code: room.code.clone(),
            expected,
            found: room.status,
        });
    }
    if !room.has_option(chosen_option) {
        return Err(EngineError::InvalidOption {
            code: room.code.clone(),
            option: chosen_option.to_owned(),
        });
    }

    let identity = match user_ref {
        Some(user_ref) => Identity::User(user_ref.clone()),
        None => participant.identity(),
    };
    if room.has_submitted(connection_id, &identity) {
        return Err(EngineError::DuplicateSubmission {
            code: room.code.clone(),
            identity,
        });
    }

    Ok(Submission {
        connection_id,
        identity,
        display_name: participant.display_name.clone(),
        chosen_option: chosen_option.to_owned(),
        submitted_at: Utc::now(),
    })
}

/// Checks and durably appends a submission. Returns the updated room.
///
/// The store repeats the status and duplicate checks atomically, so a
/// concurrent writer cannot sneak a second entry in between.
pub async fn record<S: RoomStore>(
    store: &S,
    room: &Room,
    kind: SubmissionKind,
    connection_id: ConnectionId,
    user_ref: Option<&UserRef>,
    chosen_option: &str,
) -> Result<(Submission, Room), EngineError> {
    let submission = check_submission(room, kind, connection_id, user_ref, chosen_option)?;
    let updated = store
        .append_submission(&room.code, kind.required_status(), submission.clone())
        .await?;
    Ok((submission, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use votechaos_protocol::{Host, Participant, RoomCode, RoomMode};

    fn room(status: RoomStatus) -> Room {
        let now = Utc::now();
        Room {
            code: RoomCode::parse("LEDGER").unwrap(),
            mode: RoomMode::Classic,
            host: Host {
                identity: Identity::Connection(ConnectionId::new(100)),
                display_name: "host".into(),
            },
            question: "Yes or no?".into(),
            options: vec!["Yes".into(), "No".into()],
            status,
            participants: vec![
                Participant {
                    connection_id: ConnectionId::new(1),
                    display_name: "alice".into(),
                    user_ref: Some(UserRef::new("u-alice")),
                },
                Participant {
                    connection_id: ConnectionId::new(2),
                    display_name: "bob".into(),
                    user_ref: None,
                },
            ],
            round_seconds: Some(30),
            timer_end_at: None,
            submissions: vec![],
            scores: vec![],
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_check_submission_builds_entry_from_participant() {
        let r = room(RoomStatus::Voting);
        let sub = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(1), None, "Yes").unwrap();
        assert_eq!(sub.display_name, "alice");
        assert_eq!(sub.identity, Identity::User(UserRef::new("u-alice")));

        let sub = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(2), None, "No").unwrap();
        assert_eq!(sub.identity, Identity::Connection(ConnectionId::new(2)));
    }

    #[test]
    fn test_check_submission_rejects_finished_room() {
        let r = room(RoomStatus::Finished);
        let err = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(1), None, "Yes").unwrap_err();
        assert!(matches!(err, EngineError::RoomClosed(_)));
    }

    #[test]
    fn test_check_submission_rejects_non_participant() {
        let r = room(RoomStatus::Voting);
        let err = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(9), None, "Yes").unwrap_err();
        assert!(matches!(err, EngineError::NotInRoom { .. }));
    }

    #[test]
    fn test_check_submission_rejects_wrong_round_kind() {
        let r = room(RoomStatus::Voting);
        let err = check_submission(&r, SubmissionKind::Prediction, ConnectionId::new(1), None, "Yes")
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::RoundNotActive {
                expected: RoomStatus::Prediction,
                found: RoomStatus::Voting,
                ..
            }
        ));

        let waiting = room(RoomStatus::Waiting);
        assert!(check_submission(&waiting, SubmissionKind::Vote, ConnectionId::new(1), None, "Yes").is_err());
    }

    #[test]
    fn test_check_submission_rejects_unknown_option() {
        let r = room(RoomStatus::Voting);
        let err = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(1), None, "Maybe").unwrap_err();
        assert_eq!(err.code(), "INVALID_OPTION");
    }

    #[test]
    fn test_check_submission_rejects_duplicate_connection() {
        let mut r = room(RoomStatus::Voting);
        let first = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(2), None, "Yes").unwrap();
        r.submissions.push(first);

        let err = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(2), None, "No").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubmission { .. }));
    }

    #[test]
    fn test_check_submission_rejects_duplicate_identity_on_new_connection() {
        let mut r = room(RoomStatus::Voting);
        let first = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(1), None, "Yes").unwrap();
        r.submissions.push(first);
        r.participants.push(Participant {
            connection_id: ConnectionId::new(3),
            display_name: "alice again".into(),
            user_ref: Some(UserRef::new("u-alice")),
        });

        let err = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(3), None, "No").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSubmission { .. }));
    }

    #[test]
    fn test_check_submission_prefers_supplied_user_ref() {
        let r = room(RoomStatus::Voting);
        let user = UserRef::new("u-bob");
        let sub = check_submission(&r, SubmissionKind::Vote, ConnectionId::new(2), Some(&user), "Yes").unwrap();
        assert_eq!(sub.identity, Identity::User(user));
    }
}
