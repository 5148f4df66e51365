//! Room manager: the engine's entry point.
//!
//! Owns the registry, the broadcaster, the shared round timers, one actor
//! handle per room, and the connection → room membership index. Mutating
//! operations are routed to the room's actor; queries go straight to the
//! registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use votechaos_protocol::{
    ConnectionId, Identity, Participant, Room, RoomCode, ServerMessage, Submission, UserRef,
};
use votechaos_timer::RoundTimers;

use crate::ledger::SubmissionKind;
use crate::registry::NewRoom;
use crate::room::spawn_room;
use crate::{Broadcaster, EngineConfig, EngineError, RoomHandle, RoomRegistry, RoomStore};

/// Who is asking: the connection and, if verified, the persistent user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub connection_id: ConnectionId,
    pub user_ref: Option<UserRef>,
}

impl Requester {
    pub fn anonymous(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_ref: None,
        }
    }

    pub fn user(connection_id: ConnectionId, user_ref: UserRef) -> Self {
        Self {
            connection_id,
            user_ref: Some(user_ref),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::of(self.connection_id, self.user_ref.as_ref())
    }
}

struct Inner<S, B> {
    registry: RoomRegistry<S>,
    broadcaster: Arc<B>,
    timers: RoundTimers<RoomCode>,
    rooms: Mutex<HashMap<RoomCode, RoomHandle>>,
    /// A connection is in at most one room at a time.
    memberships: Mutex<HashMap<ConnectionId, RoomCode>>,
}

/// The room lifecycle engine. Cheap to clone; clones share all state.
pub struct RoomManager<S, B> {
    inner: Arc<Inner<S, B>>,
}

impl<S, B> Clone for RoomManager<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RoomStore, B: Broadcaster> RoomManager<S, B> {
    pub fn new(store: Arc<S>, broadcaster: Arc<B>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RoomRegistry::new(store, Arc::new(config)),
                broadcaster,
                timers: RoundTimers::new(),
                rooms: Mutex::new(HashMap::new()),
                memberships: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.inner.registry.config()
    }

    pub fn registry(&self) -> &RoomRegistry<S> {
        &self.inner.registry
    }

    /// The round timers shared by every room actor.
    pub fn timers(&self) -> &RoundTimers<RoomCode> {
        &self.inner.timers
    }

    // -- Actors ------------------------------------------------------------

    /// Returns the live actor for `code`, spawning one for a stored room
    /// that has none yet.
    async fn room(&self, code: &RoomCode) -> Result<RoomHandle, EngineError> {
        if let Some(handle) = self.inner.rooms.lock().await.get(code) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }
        self.inner.registry.get_room(code).await?;
        Ok(self.spawn_if_absent(code).await)
    }

    async fn spawn_if_absent(&self, code: &RoomCode) -> RoomHandle {
        let mut rooms = self.inner.rooms.lock().await;
        match rooms.get(code) {
            Some(handle) if !handle.is_closed() => handle.clone(),
            _ => {
                rooms.retain(|_, handle| !handle.is_closed());
                let handle = spawn_room(
                    code.clone(),
                    self.inner.registry.clone(),
                    Arc::clone(&self.inner.broadcaster),
                    self.inner.timers.clone(),
                    self.config().channel_size,
                );
                rooms.insert(code.clone(), handle.clone());
                handle
            }
        }
    }

    /// Runs `op` against the room's actor. An actor that retired between
    /// lookup and send is replaced once.
    async fn with_room<T, F, Fut>(&self, code: &RoomCode, op: F) -> Result<T, EngineError>
    where
        F: Fn(RoomHandle) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        match op(self.room(code).await?).await {
            Err(EngineError::Unavailable(_)) => {
                tracing::debug!(room_code = %code, "room actor retired, respawning");
                op(self.room(code).await?).await
            }
            result => result,
        }
    }

    /// Number of running room actors. Retired ones are pruned first.
    pub async fn actor_count(&self) -> usize {
        let mut rooms = self.inner.rooms.lock().await;
        rooms.retain(|_, handle| !handle.is_closed());
        rooms.len()
    }

    // -- Queries -----------------------------------------------------------

    /// Creates a room and starts its actor, which arms the round clock for
    /// classic rooms that start immediately.
    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        let room = self.inner.registry.create_room(new).await?;
        self.spawn_if_absent(&room.code).await;
        self.inner
            .broadcaster
            .to_everyone(ServerMessage::GameStatusUpdate {
                room_code: room.code.clone(),
                status: room.status,
            })
            .await;
        Ok(room)
    }

    pub async fn get_room(&self, code: &RoomCode) -> Result<Room, EngineError> {
        self.inner.registry.get_room(code).await
    }

    pub async fn list_active(&self, user_ref: &UserRef) -> Result<Vec<Room>, EngineError> {
        self.inner.registry.list_active(user_ref).await
    }

    pub async fn list_finished(&self, user_ref: &UserRef) -> Result<Vec<Room>, EngineError> {
        self.inner.registry.list_finished(user_ref).await
    }

    // -- Membership --------------------------------------------------------

    /// Adds the requester to `code`. A connection already in a different
    /// room leaves that room once the new join has succeeded; a rejected
    /// join leaves the old membership as it was.
    pub async fn join(
        &self,
        requester: &Requester,
        code: &RoomCode,
        display_name: String,
    ) -> Result<Room, EngineError> {
        let connection_id = requester.connection_id;
        let participant = Participant {
            connection_id,
            display_name: display_name.trim().to_owned(),
            user_ref: requester.user_ref.clone(),
        };
        let room = self
            .with_room(code, |handle| {
                let participant = participant.clone();
                async move { handle.join(participant).await }
            })
            .await?;

        let previous = self
            .inner
            .memberships
            .lock()
            .await
            .insert(connection_id, code.clone());
        if let Some(previous) = previous.filter(|prev| prev != code) {
            let left = self
                .with_room(&previous, |handle| async move { handle.leave(connection_id).await })
                .await;
            if let Err(err) = left {
                tracing::warn!(room_code = %previous, %connection_id, error = %err, "failed to leave previous room");
            }
        }
        Ok(room)
    }

    pub async fn leave(
        &self,
        connection_id: ConnectionId,
        code: &RoomCode,
    ) -> Result<Room, EngineError> {
        let room = self
            .with_room(code, |handle| async move { handle.leave(connection_id).await })
            .await?;
        let mut memberships = self.inner.memberships.lock().await;
        if memberships.get(&connection_id) == Some(code) {
            memberships.remove(&connection_id);
        }
        Ok(room)
    }

    /// Removes a closed connection from the room it was in, if any.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let code = self.inner.memberships.lock().await.remove(&connection_id);
        let Some(code) = code else {
            return;
        };
        let left = self
            .with_room(&code, |handle| async move { handle.leave(connection_id).await })
            .await;
        match left {
            Ok(_) => {}
            Err(EngineError::RoomNotFound(_)) => {
                tracing::debug!(room_code = %code, %connection_id, "room gone on disconnect");
            }
            Err(err) => {
                tracing::warn!(room_code = %code, %connection_id, error = %err, "failed to remove disconnected participant");
            }
        }
    }

    /// The room `connection_id` is currently in.
    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.inner.memberships.lock().await.get(&connection_id).cloned()
    }

    // -- Submissions -------------------------------------------------------

    pub async fn submit_vote(
        &self,
        requester: &Requester,
        code: &RoomCode,
        chosen_option: String,
    ) -> Result<Submission, EngineError> {
        self.submit(SubmissionKind::Vote, requester, code, chosen_option)
            .await
    }

    pub async fn submit_prediction(
        &self,
        requester: &Requester,
        code: &RoomCode,
        chosen_option: String,
    ) -> Result<Submission, EngineError> {
        self.submit(SubmissionKind::Prediction, requester, code, chosen_option)
            .await
    }

    async fn submit(
        &self,
        kind: SubmissionKind,
        requester: &Requester,
        code: &RoomCode,
        chosen_option: String,
    ) -> Result<Submission, EngineError> {
        let connection_id = requester.connection_id;
        self.with_room(code, |handle| {
            let user_ref = requester.user_ref.clone();
            let chosen_option = chosen_option.clone();
            async move {
                handle
                    .submit(kind, connection_id, user_ref, chosen_option)
                    .await
            }
        })
        .await
    }

    // -- Host actions ------------------------------------------------------

    /// Moves a `waiting` room into its round.
    pub async fn start_round(&self, requester: &Requester, code: &RoomCode) -> Result<Room, EngineError> {
        self.with_room(code, |handle| {
            let requester = requester.identity();
            async move { handle.start_round(requester).await }
        })
        .await
    }

    /// Resolves a classic round before its timer fires.
    pub async fn end_round_early(
        &self,
        requester: &Requester,
        code: &RoomCode,
    ) -> Result<Room, EngineError> {
        self.with_room(code, |handle| {
            let requester = requester.identity();
            async move { handle.end_round(requester).await }
        })
        .await
    }

    pub async fn end_prediction(
        &self,
        requester: &Requester,
        code: &RoomCode,
        correct_option: String,
    ) -> Result<Room, EngineError> {
        self.with_room(code, |handle| {
            let requester = requester.identity();
            let correct_option = correct_option.clone();
            async move { handle.end_prediction(requester, correct_option).await }
        })
        .await
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Stops every room actor and cancels all pending round timers.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.inner.rooms.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
        self.inner.timers.cancel_all();
        tracing::info!("room manager shut down");
    }
}
