//! Room registry: code allocation and registry-mediated store access.

use std::sync::Arc;

use chrono::{Duration, Utc};
use votechaos_protocol::{
    ConnectionId, Host, Participant, ProtocolError, Room, RoomCode, RoomMode, RoomStatus, UserRef,
    validate_display_name, validate_options, validate_question, validate_round_seconds,
};

use crate::{EngineConfig, EngineError, RoomStore, StoreError};

/// Statuses reported by [`RoomRegistry::list_active`].
pub const ACTIVE_STATUSES: [RoomStatus; 3] =
    [RoomStatus::Waiting, RoomStatus::Voting, RoomStatus::Prediction];

/// Everything needed to create a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub mode: RoomMode,
    pub host: Host,
    pub question: String,
    pub options: Vec<String>,
    /// Classic round length; defaults to [`EngineConfig::default_round_seconds`].
    pub timer_seconds: Option<u64>,
    /// `false` creates the room in `waiting` until the host starts it.
    pub start_immediately: bool,
}

/// Creates rooms under unique codes and mediates all store access.
pub struct RoomRegistry<S> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
}

impl<S> Clone for RoomRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: RoomStore> RoomRegistry<S> {
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates the request, allocates a code, and stores the new room.
    ///
    /// Classic rooms start `voting` with the deadline set; prediction rooms
    /// start `prediction`. With `start_immediately == false` both start
    /// `waiting`. A code collision is retried with a fresh code up to
    /// [`EngineConfig::max_code_attempts`] times.
    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        let limits = &self.config.limits;
        let round_status = new.mode.round_status().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("{} mode is not supported", new.mode))
        })?;
        validate_question(&new.question, limits)?;
        validate_options(&new.options, limits)?;
        validate_display_name(&new.host.display_name, limits)?;

        let round_seconds = match new.mode {
            RoomMode::Classic => {
                let seconds = new.timer_seconds.unwrap_or(self.config.default_round_seconds);
                validate_round_seconds(seconds, limits)?;
                Some(seconds)
            }
            _ => None,
        };

        let status = if new.start_immediately {
            round_status
        } else {
            RoomStatus::Waiting
        };
        let now = Utc::now();
        let timer_end_at = match (status, round_seconds) {
            (RoomStatus::Voting, Some(seconds)) => Some(now + Duration::seconds(seconds as i64)),
            _ => None,
        };

        let mut last_err = None;
        for attempt in 1..=self.config.max_code_attempts {
            let code = RoomCode::generate(&mut rand::rng());
            let room = Room {
                code: code.clone(),
                mode: new.mode,
                host: new.host.clone(),
                question: new.question.trim().to_owned(),
                options: new.options.clone(),
                status,
                participants: Vec::new(),
                round_seconds,
                timer_end_at,
                submissions: Vec::new(),
                scores: Vec::new(),
                resolution: None,
                created_at: now,
                updated_at: now,
            };
            match self.store.insert(room.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        room_code = %code,
                        mode = %room.mode,
                        status = %room.status,
                        host = %room.host.identity,
                        "room created"
                    );
                    return Ok(room);
                }
                Err(StoreError::CodeTaken(taken)) => {
                    tracing::debug!(room_code = %taken, attempt, "room code collision, retrying");
                    last_err = Some(StoreError::CodeTaken(taken));
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to store new room");
                    return Err(EngineError::Persistence(err));
                }
            }
        }
        let err = last_err.unwrap_or_else(|| StoreError::Unavailable("no code attempts configured".into()));
        tracing::error!(error = %err, "gave up allocating a room code");
        Err(EngineError::Persistence(err))
    }

    pub async fn get_room(&self, code: &RoomCode) -> Result<Room, EngineError> {
        self.store
            .load(code)
            .await?
            .ok_or_else(|| EngineError::RoomNotFound(code.clone()))
    }

    /// Idempotent: re-adding a known connection leaves the room unchanged.
    pub async fn add_participant(
        &self,
        code: &RoomCode,
        participant: Participant,
    ) -> Result<Room, EngineError> {
        Ok(self.store.add_participant(code, participant).await?)
    }

    /// Idempotent: removing an absent connection is a no-op.
    pub async fn remove_participant(
        &self,
        code: &RoomCode,
        connection_id: ConnectionId,
    ) -> Result<Room, EngineError> {
        Ok(self.store.remove_participant(code, connection_id).await?)
    }

    /// Writes a transition, guarded on the status it was computed from.
    pub async fn save(&self, room: &Room, expected: RoomStatus) -> Result<(), EngineError> {
        self.store.save(room, expected).await.map_err(|err| {
            tracing::error!(room_code = %room.code, error = %err, "failed to save room");
            EngineError::from(err)
        })
    }

    /// Rooms `user_ref` is involved in that are not finished, newest first.
    pub async fn list_active(&self, user_ref: &UserRef) -> Result<Vec<Room>, EngineError> {
        Ok(self.store.list_for_user(user_ref, &ACTIVE_STATUSES).await?)
    }

    /// Finished rooms `user_ref` was involved in, newest first.
    pub async fn list_finished(&self, user_ref: &UserRef) -> Result<Vec<Room>, EngineError> {
        Ok(self
            .store
            .list_for_user(user_ref, &[RoomStatus::Finished])
            .await?)
    }
}
