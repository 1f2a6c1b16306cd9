//! Per-connection handler: frame decoding, room seating, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive frame → decode `Envelope<ClientEvent>` → check version
//!   2. Seat the connection in a room (`join_room` / `create_room`)
//!   3. Resolve the room through the connection's binding and forward
//!      game commands to its actor
//!   4. Forward room events back to the socket, in order
//!
//! A rejected command is answered with exactly one `error` frame. Room
//! events already queued for the connection are written first.

use std::sync::Arc;
use std::time::Duration;

use quizhall_bridge::Role;
use quizhall_protocol::{ClientEvent, Codec, Envelope, QuizId, RoomCode, ServerEvent};
use quizhall_room::{HostClaim, PlayerAction, QuizStore, Rejection, RoomError};
use quizhall_timer::wall_clock_millis;
use quizhall_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::lobby::Lobby;
use crate::server::ServerState;
use crate::QuizhallError;

/// Shortest gap between keep-alive pings.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

/// The room a connection sits in, and the events the room sends it.
///
/// Commands are not routed through the seat: they resolve the room from
/// the connection's binding in the lobby.
struct Seat {
    code: RoomCode,
    role: Role,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Drop guard that takes the connection out of its room when the handler
/// exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async calls.
struct SeatGuard<Q: QuizStore> {
    conn: ConnectionId,
    lobby: Arc<Lobby<Q>>,
    seat: Option<Seat>,
}

impl<Q: QuizStore> Drop for SeatGuard<Q> {
    fn drop(&mut self) {
        if self.seat.take().is_none() {
            return;
        }
        let conn = self.conn;
        let lobby = Arc::clone(&self.lobby);
        tokio::spawn(async move {
            lobby.release(conn).await;
        });
    }
}

/// Writes server frames, numbering them per connection from 1.
struct Outbound<'a, C> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
}

impl<C: Codec> Outbound<'_, C> {
    async fn send(&mut self, event: ServerEvent) -> Result<(), QuizhallError> {
        trace!(conn = %self.conn.id(), seq = self.seq, event = event.name(), "send");
        let frame = Envelope::new(self.seq, wall_clock_millis(), event);
        self.seq += 1;
        let bytes = self.codec.encode(&frame)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    /// Writes room events that are already queued.
    async fn flush(&mut self, seat: &mut Option<Seat>) -> Result<(), QuizhallError> {
        while let Some(event) = seat.as_mut().and_then(|s| s.events.try_recv().ok()) {
            self.send(event).await?;
        }
        Ok(())
    }
}

/// Handles a single connection from accept to close.
///
/// The peer counts as alive while it sends anything, pongs to the server's
/// keep-alive pings included. A connection that stays silent for
/// `connection_idle_timeout` is closed.
pub(crate) async fn handle_connection<Q, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<Q, C>>,
) -> Result<(), QuizhallError>
where
    Q: QuizStore,
    C: Codec,
{
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let mut guard = SeatGuard {
        conn: conn_id,
        lobby: Arc::clone(&state.lobby),
        seat: None,
    };
    let mut out = Outbound {
        conn: &conn,
        codec: &state.codec,
        seq: 1,
    };

    let idle_timeout = state.connection_idle_timeout;
    let mut keepalive = time::interval((idle_timeout / 3).max(MIN_PING_INTERVAL));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };

                let reply = match decode_frame(&state.codec, &data) {
                    Ok(event) => {
                        debug!(%conn_id, event = event.name(), "client event");
                        apply(&state.lobby, &mut guard, event).await
                    }
                    Err(rejection) => Err(rejection),
                };
                out.flush(&mut guard.seat).await?;
                match reply {
                    Ok(Some(event)) => out.send(event).await?,
                    Ok(None) => {}
                    Err(rejection) => {
                        debug!(%conn_id, %rejection, "command rejected");
                        out.send(rejection.to_event()).await?;
                    }
                }
            }
            event = room_event(&mut guard.seat) => match event {
                Some(event) => out.send(event).await?,
                None => {
                    // The room dropped our sender: it closed or removed us.
                    if let Some(seat) = guard.seat.take() {
                        info!(%conn_id, room = %seat.code, role = %seat.role, "room closed under connection");
                        state.lobby.unbind(conn_id).await;
                    }
                }
            },
            _ = keepalive.tick() => {
                if conn.last_seen().elapsed() >= idle_timeout {
                    info!(%conn_id, "connection idle, closing");
                    break;
                }
                if let Err(e) = conn.ping().await {
                    debug!(%conn_id, error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    if let Err(e) = conn.close().await {
        trace!(%conn_id, error = %e, "close failed");
    }
    // guard drops here → release fires.
    Ok(())
}

/// Pends forever while the connection has no seat.
async fn room_event(seat: &mut Option<Seat>) -> Option<ServerEvent> {
    match seat {
        Some(seat) => seat.events.recv().await,
        None => std::future::pending().await,
    }
}

fn decode_frame<C: Codec>(codec: &C, data: &[u8]) -> Result<ClientEvent, Rejection> {
    let envelope: Envelope<ClientEvent> = codec
        .decode(data)
        .map_err(|e| Rejection::violation(format!("Malformed message: {e}")))?;
    envelope
        .check_version()
        .map_err(|e| Rejection::violation(e.to_string()))?;
    Ok(envelope.payload)
}

/// Runs one client event. `Ok(Some(_))` is a direct reply to the sender.
async fn apply<Q: QuizStore>(
    lobby: &Lobby<Q>,
    guard: &mut SeatGuard<Q>,
    event: ClientEvent,
) -> Result<Option<ServerEvent>, Rejection> {
    match event {
        ClientEvent::JoinRoom {
            username,
            room_code,
            is_host,
        } => {
            let claim = is_host.then_some(HostClaim::Join);
            take_seat(lobby, guard, &room_code, &username, claim, None).await?;
        }
        ClientEvent::CreateRoom {
            username,
            quiz_id,
            room_code,
        } => {
            take_seat(
                lobby,
                guard,
                &room_code,
                &username,
                Some(HostClaim::Create),
                Some(quiz_id),
            )
            .await?;
        }
        ClientEvent::StartGame { room_code } => {
            host_action(lobby, guard, &room_code, PlayerAction::Start).await?;
        }
        ClientEvent::NextQuestion { room_code } => {
            host_action(lobby, guard, &room_code, PlayerAction::Next).await?;
        }
        ClientEvent::EndGame { room_code } => {
            host_action(lobby, guard, &room_code, PlayerAction::End).await?;
        }
        ClientEvent::SubmitAnswer { answer } => {
            act(lobby, guard, None, PlayerAction::SubmitChoice(answer)).await?;
        }
        ClientEvent::SubmitOpenAnswer {
            answer_text,
            question_index,
        } => {
            let action = PlayerAction::SubmitText {
                text: answer_text,
                question_index,
            };
            act(lobby, guard, None, action).await?;
        }
        ClientEvent::RequestSnapshot(_) => {
            act(lobby, guard, None, PlayerAction::Snapshot).await?;
        }
        ClientEvent::LeaveRoom(_) => {
            guard.seat = None;
            if lobby.release(guard.conn).await.is_none() {
                return Err(Rejection::violation("Not in a room"));
            }
        }
        ClientEvent::Heartbeat { client_time } => {
            return Ok(Some(ServerEvent::HeartbeatAck {
                client_time,
                server_time: wall_clock_millis(),
            }));
        }
    }
    Ok(None)
}

/// Seats the connection. The binding is recorded before the room is asked
/// and rolled back if the room refuses, so the bridge never misses a
/// seated connection.
async fn take_seat<Q: QuizStore>(
    lobby: &Lobby<Q>,
    guard: &mut SeatGuard<Q>,
    raw_code: &str,
    username: &str,
    claim: Option<HostClaim>,
    quiz_id: Option<QuizId>,
) -> Result<(), Rejection> {
    if let Some(seat) = &guard.seat {
        return Err(Rejection::conflict(format!(
            "Already in room {}; leave it first",
            seat.code
        )));
    }
    let conn = guard.conn;
    let handle = lobby.find(raw_code).await.map_err(|e| e.to_rejection())?;
    let role = if claim.is_some() { Role::Host } else { Role::Player };

    lobby
        .bind(conn, handle.code().clone(), role, username)
        .await
        .map_err(|e| Rejection::conflict(e.to_string()))?;

    let (sender, events) = mpsc::unbounded_channel();
    let seated = match claim {
        Some(claim) => {
            handle
                .attach_host(conn, username, quiz_id, claim, sender)
                .await
        }
        None => handle.join(conn, username, sender).await.map(|_| ()),
    };
    if let Err(e) = seated {
        lobby.unbind(conn).await;
        return Err(e.to_rejection());
    }

    guard.seat = Some(Seat {
        code: handle.code().clone(),
        role,
        events,
    });
    Ok(())
}

/// Host commands name their room; it must be the one the connection sits in.
async fn host_action<Q: QuizStore>(
    lobby: &Lobby<Q>,
    guard: &mut SeatGuard<Q>,
    raw_code: &str,
    action: PlayerAction,
) -> Result<(), Rejection> {
    act(lobby, guard, Some(raw_code), action).await
}

/// Forwards `action` to the room the connection is bound to.
async fn act<Q: QuizStore>(
    lobby: &Lobby<Q>,
    guard: &mut SeatGuard<Q>,
    named_room: Option<&str>,
    action: PlayerAction,
) -> Result<(), Rejection> {
    let result = match lobby.resolve(guard.conn).await {
        Ok((handle, binding)) => {
            if let Some(raw) = named_room {
                if RoomCode::parse(raw).ok().as_ref() != Some(&binding.room) {
                    return Err(Rejection::forbidden(format!(
                        "Not a member of room {}",
                        raw.trim()
                    )));
                }
            }
            handle.act(guard.conn, action).await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if matches!(err, RoomError::Unavailable(_)) {
                guard.seat = None;
                lobby.unbind(guard.conn).await;
            }
            Err(err.to_rejection())
        }
    }
}
