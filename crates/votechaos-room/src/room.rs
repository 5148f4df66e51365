//! Room actor: one Tokio task per room code.
//!
//! Every state-changing operation on a room, including round expiry, is a
//! [`RoomCommand`] on the actor's queue, so operations on one room are
//! applied strictly in arrival order and never interleave. Rooms are
//! independent of each other.
//!
//! Each command re-reads the room from the store, checks its preconditions
//! against that fresh copy, writes through a status-guarded save, and only
//! then broadcasts. A failed write leaves nothing half applied: no timer is
//! cancelled and no event is sent.
//!
//! Once its room is finished an actor stops accepting commands, answers the
//! ones already queued, and exits. The manager spawns a fresh actor for any
//! later request; against a finished room every such request is a read or a
//! rejection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use votechaos_protocol::{
    ConnectionId, Identity, Participant, ProtocolError, Room, RoomCode, RoomStatus,
    ServerMessage, Submission, UserRef,
};
use votechaos_timer::{RoundTimers, TimerToken};

use crate::ledger::{self, SubmissionKind};
use crate::resolver::{resolve_classic, resolve_prediction};
use crate::{Broadcaster, EngineError, RoomRegistry, RoomStore};

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        participant: Participant,
        reply: Reply<Room>,
    },

    Leave {
        connection_id: ConnectionId,
        reply: Reply<Room>,
    },

    Submit {
        kind: SubmissionKind,
        connection_id: ConnectionId,
        user_ref: Option<UserRef>,
        chosen_option: String,
        reply: Reply<Submission>,
    },

    StartRound {
        requester: Identity,
        reply: Reply<Room>,
    },

    EndRound {
        requester: Identity,
        reply: Reply<Room>,
    },

    EndPrediction {
        requester: Identity,
        correct_option: String,
        reply: Reply<Room>,
    },

    /// Sent by the round timer. Carries the token it was armed with.
    TimerExpired { token: TimerToken },

    Snapshot { reply: Reply<Room> },

    Shutdown,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Unavailable(self.code.clone()))?
    }

    pub async fn join(&self, participant: Participant) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::Join { participant, reply })
            .await
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::Leave {
            connection_id,
            reply,
        })
        .await
    }

    pub async fn submit(
        &self,
        kind: SubmissionKind,
        connection_id: ConnectionId,
        user_ref: Option<UserRef>,
        chosen_option: String,
    ) -> Result<Submission, EngineError> {
        self.request(|reply| RoomCommand::Submit {
            kind,
            connection_id,
            user_ref,
            chosen_option,
            reply,
        })
        .await
    }

    pub async fn start_round(&self, requester: Identity) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::StartRound { requester, reply })
            .await
    }

    pub async fn end_round(&self, requester: Identity) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::EndRound { requester, reply })
            .await
    }

    pub async fn end_prediction(
        &self,
        requester: Identity,
        correct_option: String,
    ) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::EndPrediction {
            requester,
            correct_option,
            reply,
        })
        .await
    }

    /// The room as currently stored, read in queue order.
    pub async fn snapshot(&self) -> Result<Room, EngineError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Tells the actor to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| EngineError::Unavailable(self.code.clone()))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RoomActor<S, B> {
    code: RoomCode,
    registry: RoomRegistry<S>,
    broadcaster: Arc<B>,
    timers: RoundTimers<RoomCode>,
    /// Token of the deadline this actor armed, if still pending.
    armed: Option<TimerToken>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Weak so pending timers do not keep the actor alive.
    mailbox: mpsc::WeakSender<RoomCommand>,
    /// Set when the room is known to be finished; the actor then retires.
    finished: bool,
}

impl<S: RoomStore, B: Broadcaster> RoomActor<S, B> {
    async fn run(mut self) {
        tracing::info!(room_code = %self.code, "room actor started");
        self.resume_timer().await;

        let mut retiring = false;
        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle(cmd).await {
                break;
            }
            if self.finished && !retiring {
                // Refuse new commands; `recv` still yields the queued ones.
                self.receiver.close();
                retiring = true;
                tracing::debug!(room_code = %self.code, "room finished, actor retiring");
            }
        }

        if let Some(token) = self.armed.take() {
            self.timers.clear(&self.code, token);
        }
        tracing::info!(room_code = %self.code, "room actor stopped");
    }

    /// Applies one command. Returns `false` on shutdown.
    async fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join { participant, reply } => {
                let result = self.handle_join(participant).await;
                self.respond("join", reply, result);
            }
            RoomCommand::Leave {
                connection_id,
                reply,
            } => {
                let result = self.handle_leave(connection_id).await;
                self.respond("leave", reply, result);
            }
            RoomCommand::Submit {
                kind,
                connection_id,
                user_ref,
                chosen_option,
                reply,
            } => {
                let result = self
                    .handle_submit(kind, connection_id, user_ref, chosen_option)
                    .await;
                self.respond("submit", reply, result);
            }
            RoomCommand::StartRound { requester, reply } => {
                let result = self.handle_start_round(&requester).await;
                self.respond("start_round", reply, result);
            }
            RoomCommand::EndRound { requester, reply } => {
                let result = self.handle_end_round(&requester).await;
                self.respond("end_round", reply, result);
            }
            RoomCommand::EndPrediction {
                requester,
                correct_option,
                reply,
            } => {
                let result = self.handle_end_prediction(&requester, correct_option).await;
                self.respond("end_prediction", reply, result);
            }
            RoomCommand::TimerExpired { token } => {
                self.handle_timer_expired(token).await;
            }
            RoomCommand::Snapshot { reply } => {
                let result = self.load().await;
                let _ = reply.send(result);
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_code = %self.code, "room shutting down");
                return false;
            }
        }
        true
    }

    fn respond<T>(&self, op: &'static str, reply: Reply<T>, result: Result<T, EngineError>) {
        if let Err(err) = &result {
            match err {
                EngineError::Persistence(_) => {
                    tracing::error!(room_code = %self.code, op, error = %err, "room operation failed");
                }
                _ => {
                    tracing::debug!(room_code = %self.code, op, code = err.code(), reason = %err, "room operation rejected");
                }
            }
        }
        let _ = reply.send(result);
    }

    async fn load(&mut self) -> Result<Room, EngineError> {
        let room = self.registry.get_room(&self.code).await?;
        if room.status == RoomStatus::Finished {
            self.finished = true;
        }
        Ok(room)
    }

    /// Finished rooms reject everything; host-only actions need the host.
    fn authorize_host(&self, room: &Room, requester: &Identity) -> Result<(), EngineError> {
        if room.status == RoomStatus::Finished {
            return Err(EngineError::RoomClosed(self.code.clone()));
        }
        if !room.is_host(requester) {
            return Err(EngineError::Unauthorized {
                code: self.code.clone(),
                identity: requester.clone(),
            });
        }
        Ok(())
    }

    /// Rejects unless `room` is in `from` and `from → to` is a legal step.
    fn check_transition(
        &self,
        room: &Room,
        from: RoomStatus,
        to: RoomStatus,
    ) -> Result<(), EngineError> {
        if room.status == from && from.can_transition_to(to) {
            return Ok(());
        }
        Err(EngineError::RoundNotActive {
            code: self.code.clone(),
            expected: from,
            found: room.status,
        })
    }

    // -- Timer -------------------------------------------------------------

    fn arm(&mut self, after: Duration) {
        let mailbox = self.mailbox.clone();
        let token = self
            .timers
            .schedule(self.code.clone(), after, move |token| async move {
                if let Some(tx) = mailbox.upgrade() {
                    let _ = tx.send(RoomCommand::TimerExpired { token }).await;
                }
            });
        self.armed = Some(token);
    }

    /// Arms the round clock for a room that is already `voting` when its
    /// actor starts: freshly created, or loaded from a durable store. An
    /// elapsed deadline fires immediately.
    async fn resume_timer(&mut self) {
        let room = match self.load().await {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(room_code = %self.code, error = %err, "could not load room on start");
                return;
            }
        };
        if room.status != RoomStatus::Voting {
            return;
        }
        let after = match (room.timer_end_at, room.round_seconds) {
            (Some(end), _) => (end - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            (None, Some(seconds)) => Duration::from_secs(seconds),
            (None, None) => Duration::from_secs(self.registry.config().default_round_seconds),
        };
        self.arm(after);
    }

    /// Resolves the round the expired deadline belongs to. The token stays
    /// armed until the resolution is saved; a failed attempt re-arms the
    /// clock after [`EngineConfig::expiry_retry_seconds`](crate::EngineConfig).
    async fn handle_timer_expired(&mut self, token: TimerToken) {
        if self.armed != Some(token) {
            tracing::debug!(room_code = %self.code, %token, "stale round timer ignored");
            return;
        }

        let result = match self.load().await {
            Ok(room) if room.status != RoomStatus::Voting => {
                tracing::debug!(room_code = %self.code, status = %room.status, "round already resolved");
                self.armed = None;
                return;
            }
            Ok(room) => {
                tracing::info!(room_code = %self.code, "round timer expired");
                self.finish_classic(room).await.map(|_| ())
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            let retry = Duration::from_secs(self.registry.config().expiry_retry_seconds);
            tracing::error!(
                room_code = %self.code,
                error = %err,
                retry_secs = retry.as_secs(),
                "failed to resolve expired round, retrying"
            );
            self.arm(retry);
        }
    }

    // -- Membership --------------------------------------------------------

    async fn handle_join(&mut self, participant: Participant) -> Result<Room, EngineError> {
        let room = self.load().await?;
        if !room.status.is_open() {
            return Err(EngineError::RoomClosed(self.code.clone()));
        }

        let connection_id = participant.connection_id;
        let room = self.registry.add_participant(&self.code, participant).await?;

        self.broadcaster.subscribe(&self.code, connection_id).await;
        self.broadcaster
            .to_connection(connection_id, ServerMessage::PlayerInfo { connection_id })
            .await;
        self.broadcaster
            .to_room(&self.code, room_update(&room))
            .await;

        // Late joiners catch up with the round in progress.
        match room.status {
            RoomStatus::Voting => {
                let msg = ServerMessage::GameStarted {
                    room_code: self.code.clone(),
                    question: room.question.clone(),
                    options: room.options.clone(),
                    round_time_seconds: room.remaining_round_seconds(Utc::now()),
                };
                self.broadcaster.to_connection(connection_id, msg).await;
            }
            RoomStatus::Prediction => {
                let msg = prediction_started(&room);
                self.broadcaster.to_connection(connection_id, msg).await;
            }
            RoomStatus::Waiting | RoomStatus::Finished => {}
        }

        tracing::info!(
            room_code = %self.code,
            %connection_id,
            participants = room.participants.len(),
            "participant joined"
        );
        Ok(room)
    }

    /// Finished rooms keep their participant list as history.
    async fn handle_leave(&mut self, connection_id: ConnectionId) -> Result<Room, EngineError> {
        let room = self.load().await?;
        if !room.status.is_open() || room.participant(connection_id).is_none() {
            self.broadcaster.unsubscribe(&self.code, connection_id).await;
            return Ok(room);
        }

        let room = self
            .registry
            .remove_participant(&self.code, connection_id)
            .await?;
        self.broadcaster.unsubscribe(&self.code, connection_id).await;
        self.broadcaster
            .to_room(&self.code, room_update(&room))
            .await;

        tracing::info!(
            room_code = %self.code,
            %connection_id,
            participants = room.participants.len(),
            "participant left"
        );
        Ok(room)
    }

    // -- Submissions -------------------------------------------------------

    async fn handle_submit(
        &mut self,
        kind: SubmissionKind,
        connection_id: ConnectionId,
        user_ref: Option<UserRef>,
        chosen_option: String,
    ) -> Result<Submission, EngineError> {
        let room = self.load().await?;
        let (submission, room) = ledger::record(
            self.registry.store(),
            &room,
            kind,
            connection_id,
            user_ref.as_ref(),
            &chosen_option,
        )
        .await?;

        self.broadcaster
            .to_connection(
                connection_id,
                ServerMessage::SubmissionAccepted {
                    room_code: self.code.clone(),
                    chosen_option: submission.chosen_option.clone(),
                },
            )
            .await;

        tracing::debug!(
            room_code = %self.code,
            %connection_id,
            identity = %submission.identity,
            submissions = room.submissions.len(),
            "submission recorded"
        );
        Ok(submission)
    }

    // -- Round transitions -------------------------------------------------

    async fn handle_start_round(&mut self, requester: &Identity) -> Result<Room, EngineError> {
        let mut room = self.load().await?;
        self.authorize_host(&room, requester)?;
        let next = room.mode.round_status().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("{} mode is not supported", room.mode))
        })?;
        self.check_transition(&room, RoomStatus::Waiting, next)?;

        let now = Utc::now();
        room.status = next;
        room.updated_at = now;
        let round_length = if next == RoomStatus::Voting {
            let seconds = room
                .round_seconds
                .unwrap_or(self.registry.config().default_round_seconds);
            room.round_seconds = Some(seconds);
            room.timer_end_at = Some(now + chrono::Duration::seconds(seconds as i64));
            Some(seconds)
        } else {
            None
        };

        self.registry.save(&room, RoomStatus::Waiting).await?;

        let started = match round_length {
            Some(seconds) => {
                self.arm(Duration::from_secs(seconds));
                ServerMessage::GameStarted {
                    room_code: self.code.clone(),
                    question: room.question.clone(),
                    options: room.options.clone(),
                    round_time_seconds: seconds,
                }
            }
            None => prediction_started(&room),
        };
        self.broadcaster.to_room(&self.code, started).await;
        self.broadcast_status(room.status).await;

        tracing::info!(room_code = %self.code, status = %room.status, "round started");
        Ok(room)
    }

    async fn handle_end_round(&mut self, requester: &Identity) -> Result<Room, EngineError> {
        let room = self.load().await?;
        self.authorize_host(&room, requester)?;
        self.check_transition(&room, RoomStatus::Voting, RoomStatus::Finished)?;
        tracing::info!(room_code = %self.code, "round ended early by host");
        self.finish_classic(room).await
    }

    /// Resolves a `voting` room. Shared by early end and timer expiry.
    async fn finish_classic(&mut self, mut room: Room) -> Result<Room, EngineError> {
        let outcome = resolve_classic(&room.options, &room.submissions);
        room.status = RoomStatus::Finished;
        room.timer_end_at = None;
        room.resolution = Some(outcome.clone().into());
        room.updated_at = Utc::now();

        self.registry.save(&room, RoomStatus::Voting).await?;
        self.finished = true;

        if let Some(token) = self.armed.take() {
            self.timers.clear(&self.code, token);
        }

        self.broadcaster
            .to_room(
                &self.code,
                ServerMessage::RoundEnded {
                    room_code: self.code.clone(),
                    question: room.question.clone(),
                    submissions: room.submissions.clone(),
                    tally: outcome.tally,
                    winner: outcome.winner.clone(),
                    total_votes: outcome.total_votes,
                },
            )
            .await;
        self.broadcast_status(room.status).await;

        tracing::info!(
            room_code = %self.code,
            winner = ?outcome.winner,
            total_votes = outcome.total_votes,
            "classic round resolved"
        );
        Ok(room)
    }

    async fn handle_end_prediction(
        &mut self,
        requester: &Identity,
        correct_option: String,
    ) -> Result<Room, EngineError> {
        let mut room = self.load().await?;
        self.authorize_host(&room, requester)?;
        self.check_transition(&room, RoomStatus::Prediction, RoomStatus::Finished)?;
        if !room.has_option(&correct_option) {
            return Err(EngineError::InvalidOption {
                code: self.code.clone(),
                option: correct_option,
            });
        }

        let outcome = resolve_prediction(&room.submissions, &correct_option, &room.scores);
        room.scores = outcome.scores.clone();
        room.status = RoomStatus::Finished;
        room.resolution = Some(outcome.clone().into());
        room.updated_at = Utc::now();

        self.registry.save(&room, RoomStatus::Prediction).await?;
        self.finished = true;

        self.broadcaster
            .to_room(
                &self.code,
                ServerMessage::PredictionEnded {
                    room_code: self.code.clone(),
                    question: room.question.clone(),
                    correct_option: outcome.correct_option,
                    winners: outcome.winners.clone(),
                    scores: outcome.scores,
                },
            )
            .await;
        self.broadcast_status(room.status).await;

        tracing::info!(
            room_code = %self.code,
            winners = outcome.winners.len(),
            "prediction round resolved"
        );
        Ok(room)
    }

    async fn broadcast_status(&self, status: RoomStatus) {
        self.broadcaster
            .to_everyone(ServerMessage::GameStatusUpdate {
                room_code: self.code.clone(),
                status,
            })
            .await;
    }
}

fn room_update(room: &Room) -> ServerMessage {
    ServerMessage::RoomUpdate {
        room_code: room.code.clone(),
        participants: room.participants.clone(),
    }
}

fn prediction_started(room: &Room) -> ServerMessage {
    ServerMessage::PredictionStarted {
        room_code: room.code.clone(),
        question: room.question.clone(),
        options: room.options.clone(),
    }
}

/// Spawns a room actor and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room<S: RoomStore, B: Broadcaster>(
    code: RoomCode,
    registry: RoomRegistry<S>,
    broadcaster: Arc<B>,
    timers: RoundTimers<RoomCode>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = RoomActor {
        code: code.clone(),
        registry,
        broadcaster,
        timers,
        armed: None,
        receiver: rx,
        mailbox: tx.downgrade(),
        finished: false,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
