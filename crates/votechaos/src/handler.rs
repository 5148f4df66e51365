//! Per-connection handler: framing, boundary validation, and routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbox with the gateway and spawn the writer task
//!   2. Loop: receive frames → decode → validate → dispatch to the engine
//!   3. On close or idle timeout: leave the room, drop the outbox
//!
//! Everything the client receives, direct replies included, goes through
//! the gateway outbox, so replies and room broadcasts arrive in the order
//! they were produced.

use std::sync::Arc;

use chrono::Utc;
use votechaos_protocol::{
    ClientMessage, Codec, ConnectionId, Envelope, Host, ServerMessage, UserRef, Validate,
};
use votechaos_room::{Broadcaster, EngineError, NewRoom, Requester, RoomStore};
use votechaos_transport::{WebSocketConnection, WebSocketSender};

use crate::gateway::Outbox;
use crate::server::ServerState;
use crate::{IdentityError, IdentityVerifier, VoteChaosError};

/// Drop guard that removes the connection from its room and the gateway
/// when the handler exits.
///
/// Runs even if the handler panics. Since `Drop` is synchronous, we spawn a
/// fire-and-forget task for the async cleanup.
struct ConnectionGuard<S: RoomStore, V: IdentityVerifier, C: Codec> {
    connection_id: ConnectionId,
    state: Arc<ServerState<S, V, C>>,
}

impl<S: RoomStore, V: IdentityVerifier, C: Codec> Drop for ConnectionGuard<S, V, C> {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.engine.disconnect(connection_id).await;
            state.gateway.unregister(connection_id).await;
            tracing::debug!(%connection_id, "connection cleaned up");
        });
    }
}

/// A client-facing rejection: `errorMessage{code, reason}`.
#[derive(Debug)]
struct Rejection {
    code: &'static str,
    reason: String,
}

impl Rejection {
    fn new(code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for Rejection {
    fn from(err: EngineError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<IdentityError> for Rejection {
    fn from(err: IdentityError) -> Self {
        Self::new("UNAUTHORIZED", err.to_string())
    }
}

/// What the server knows about the client on this connection.
struct Session {
    connection_id: ConnectionId,
    /// Set once the client presents a verified `persistentUserRef`.
    user_ref: Option<UserRef>,
}

impl Session {
    fn requester(&self) -> Requester {
        Requester {
            connection_id: self.connection_id,
            user_ref: self.user_ref.clone(),
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, V, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, V, C>>,
) -> Result<(), VoteChaosError>
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec + Clone,
{
    let connection_id = conn.id();
    tracing::info!(%connection_id, peer = %conn.peer(), "client connected");

    let (sender, mut receiver) = conn.split();
    let outbox = state.gateway.register(connection_id).await;
    tokio::spawn(write_loop(connection_id, sender, outbox, state.codec.clone()));

    let _guard = ConnectionGuard {
        connection_id,
        state: Arc::clone(&state),
    };
    let mut session = Session {
        connection_id,
        user_ref: None,
    };

    loop {
        let text = match tokio::time::timeout(state.idle_timeout, receiver.recv()).await {
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => {
                tracing::info!(%connection_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                return Err(e.into());
            }
            Err(_) => {
                tracing::info!(%connection_id, "connection timed out");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&text) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "failed to decode envelope");
                reject(&state, connection_id, Rejection::new("PARSE_ERROR", e.to_string())).await;
                continue;
            }
        };

        let msg = envelope.payload;
        let kind = msg.kind();
        if let Err(e) = msg.validate(&state.engine.config().limits) {
            tracing::debug!(%connection_id, kind, error = %e, "invalid message");
            reject(&state, connection_id, Rejection::new("VALIDATION_ERROR", e.to_string())).await;
            continue;
        }

        tracing::trace!(%connection_id, kind, seq = envelope.seq, "dispatching");
        if let Err(rejection) = dispatch(&state, &mut session, msg).await {
            tracing::debug!(
                %connection_id,
                kind,
                code = rejection.code,
                reason = %rejection.reason,
                "request rejected"
            );
            reject(&state, connection_id, rejection).await;
        }
    }

    // _guard drops here → room leave and outbox removal fire.
    Ok(())
}

/// Routes one validated message to the engine.
async fn dispatch<S, V, C>(
    state: &ServerState<S, V, C>,
    session: &mut Session,
    msg: ClientMessage,
) -> Result<(), Rejection>
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec,
{
    let connection_id = session.connection_id;
    let engine = &state.engine;

    match msg {
        ClientMessage::JoinRoom {
            room_code,
            display_name,
            persistent_user_ref,
        } => {
            adopt_user_ref(state, session, persistent_user_ref.as_ref()).await?;
            engine
                .join(&session.requester(), &room_code, display_name)
                .await?;
        }

        ClientMessage::LeaveRoom { room_code } => {
            engine.leave(connection_id, &room_code).await?;
        }

        ClientMessage::SubmitVote {
            room_code,
            connection_id: claimed,
            chosen_option,
        } => {
            if claimed.is_some_and(|claimed| claimed != connection_id) {
                return Err(Rejection::new(
                    "UNAUTHORIZED",
                    "connectionId does not match this connection",
                ));
            }
            engine
                .submit_vote(&session.requester(), &room_code, chosen_option)
                .await?;
        }

        ClientMessage::SubmitPrediction {
            room_code,
            chosen_option,
            persistent_user_ref,
        } => {
            adopt_user_ref(state, session, persistent_user_ref.as_ref()).await?;
            engine
                .submit_prediction(&session.requester(), &room_code, chosen_option)
                .await?;
        }

        ClientMessage::StartRound { room_code } => {
            engine.start_round(&session.requester(), &room_code).await?;
        }

        ClientMessage::EndRound { room_code } => {
            engine
                .end_round_early(&session.requester(), &room_code)
                .await?;
        }

        ClientMessage::EndPrediction {
            room_code,
            correct_option,
        } => {
            engine
                .end_prediction(&session.requester(), &room_code, correct_option)
                .await?;
        }

        ClientMessage::CreateRoom {
            mode,
            question,
            options,
            timer_seconds,
            host_name,
            persistent_user_ref,
            start_immediately,
        } => {
            adopt_user_ref(state, session, persistent_user_ref.as_ref()).await?;
            let room = engine
                .create_room(NewRoom {
                    mode,
                    host: Host {
                        identity: session.requester().identity(),
                        display_name: host_name.trim().to_owned(),
                    },
                    question,
                    options: options.iter().map(|o| o.trim().to_owned()).collect(),
                    timer_seconds,
                    start_immediately: start_immediately.unwrap_or(true),
                })
                .await?;
            reply(state, connection_id, ServerMessage::RoomCreated { room }).await;
        }

        ClientMessage::GetRoom { room_code } => {
            let room = engine.get_room(&room_code).await?;
            reply(state, connection_id, ServerMessage::RoomDetails { room }).await;
        }

        ClientMessage::ListActiveRooms { user_ref } => {
            let user_ref = state.verifier.verify(&user_ref).await?;
            let rooms = engine.list_active(&user_ref).await?;
            reply(state, connection_id, ServerMessage::RoomList { rooms }).await;
        }

        ClientMessage::ListFinishedRooms { user_ref } => {
            let user_ref = state.verifier.verify(&user_ref).await?;
            let rooms = engine.list_finished(&user_ref).await?;
            reply(state, connection_id, ServerMessage::RoomList { rooms }).await;
        }

        ClientMessage::Heartbeat { client_time } => {
            let ack = ServerMessage::HeartbeatAck {
                client_time,
                server_time: now_millis(),
            };
            reply(state, connection_id, ack).await;
        }
    }

    Ok(())
}

/// Verifies a claimed user ref and binds it to the session.
async fn adopt_user_ref<S, V, C>(
    state: &ServerState<S, V, C>,
    session: &mut Session,
    claimed: Option<&UserRef>,
) -> Result<(), Rejection>
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec,
{
    let Some(claimed) = claimed else {
        return Ok(());
    };
    let verified = state.verifier.verify(claimed).await?;
    if session.user_ref.as_ref() != Some(&verified) {
        tracing::debug!(connection_id = %session.connection_id, user_ref = %verified, "user ref bound to connection");
        session.user_ref = Some(verified);
    }
    Ok(())
}

async fn reply<S, V, C>(state: &ServerState<S, V, C>, connection_id: ConnectionId, msg: ServerMessage)
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec,
{
    state.gateway.to_connection(connection_id, msg).await;
}

async fn reject<S, V, C>(state: &ServerState<S, V, C>, connection_id: ConnectionId, rejection: Rejection)
where
    S: RoomStore,
    V: IdentityVerifier,
    C: Codec,
{
    reply(
        state,
        connection_id,
        ServerMessage::error(rejection.code, rejection.reason),
    )
    .await;
}

/// Drains the connection's outbox onto the socket, one envelope per frame.
async fn write_loop<C: Codec>(
    connection_id: ConnectionId,
    mut sender: WebSocketSender,
    mut outbox: Outbox,
    codec: C,
) {
    let mut seq: u64 = 1;

    while let Some(msg) = outbox.recv().await {
        let envelope = Envelope::new(next_seq(&mut seq), now_millis(), msg);
        let text = match codec.encode(&envelope) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%connection_id, error = %e, "failed to encode server message");
                continue;
            }
        };
        if let Err(e) = sender.send_text(text).await {
            tracing::debug!(%connection_id, error = %e, "send failed, stopping writer");
            return;
        }
    }

    let _ = sender.close().await;
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use votechaos_protocol::RoomCode;

    #[test]
    fn test_next_seq_increments() {
        let mut seq = 1;
        assert_eq!(next_seq(&mut seq), 1);
        assert_eq!(next_seq(&mut seq), 2);
        assert_eq!(seq, 3);
    }

    #[test]
    fn test_rejection_from_engine_error_uses_wire_code() {
        let code = RoomCode::parse("ABCDEF").unwrap();
        let rejection = Rejection::from(EngineError::RoomClosed(code));
        assert_eq!(rejection.code, "ROOM_CLOSED");
        assert!(rejection.reason.contains("ABCDEF"));
    }

    #[test]
    fn test_rejection_from_identity_error_is_unauthorized() {
        let rejection = Rejection::from(IdentityError::Rejected("nope".into()));
        assert_eq!(rejection.code, "UNAUTHORIZED");
    }
}
