//! Room actor: one Tokio task per quiz room.
//!
//! The actor owns the [`QuizSession`] and is the only code that touches
//! it. Connection handlers talk to it through a [`RoomHandle`]; commands
//! are processed strictly in arrival order, interleaved with the room's
//! timer and idle timeout.

use std::sync::Arc;

use quizhall_protocol::{PlayerId, QuizId, RoomCode, SessionPhase};
use quizhall_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::dispatch::EventSender;
use crate::session::{HostClaim, OpenAnswer, QuizSession};
use crate::{Quiz, Rejection, RoomConfig, RoomError};

/// A command from a bound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    /// Host: start the game.
    Start,
    /// Player: answer the open choice question.
    SubmitChoice(i64),
    /// Player: answer the open text question.
    SubmitText { text: String, question_index: usize },
    /// Host: advance past a locked question.
    Next,
    /// Host: end the game now.
    End,
    /// Anyone: request a `room_snapshot`.
    Snapshot,
}

type Reply<T> = oneshot::Sender<Result<T, Rejection>>;

pub(crate) enum RoomCommand {
    AttachHost {
        conn: ConnectionId,
        username: String,
        quiz_id: Option<QuizId>,
        claim: HostClaim,
        sender: EventSender,
        reply: Reply<()>,
    },
    Join {
        conn: ConnectionId,
        username: String,
        sender: EventSender,
        reply: Reply<PlayerId>,
    },
    Detach {
        conn: ConnectionId,
        reply: Reply<()>,
    },
    Act {
        conn: ConnectionId,
        action: PlayerAction,
        reply: Reply<()>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// A snapshot of room metadata, for the lobby API and operators.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub quiz_id: QuizId,
    pub quiz_title: String,
    pub phase: SessionPhase,
    pub player_count: usize,
    pub question_count: usize,
    pub host_attached: bool,
    pub host_name: Option<String>,
    /// Open-text answers collected so far.
    pub open_answers: Vec<OpenAnswer>,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AttachHost { .. } => "AttachHost",
            Self::Join { .. } => "Join",
            Self::Detach { .. } => "Detach",
            Self::Act { .. } => "Act",
            Self::Info { .. } => "Info",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl RoomHandle {
    /// The room's code.
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
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        let result = reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        Ok(result?)
    }

    /// Seats the host. Room events for the host go to `sender`.
    pub async fn attach_host(
        &self,
        conn: ConnectionId,
        username: impl Into<String>,
        quiz_id: Option<QuizId>,
        claim: HostClaim,
        sender: EventSender,
    ) -> Result<(), RoomError> {
        let username = username.into();
        self.request(|reply| RoomCommand::AttachHost {
            conn,
            username,
            quiz_id,
            claim,
            sender,
            reply,
        })
        .await
    }

    /// Adds a player. Room events for the player go to `sender`.
    pub async fn join(
        &self,
        conn: ConnectionId,
        username: impl Into<String>,
        sender: EventSender,
    ) -> Result<PlayerId, RoomError> {
        let username = username.into();
        self.request(|reply| RoomCommand::Join {
            conn,
            username,
            sender,
            reply,
        })
        .await
    }

    /// Removes a connection, host or player.
    pub async fn detach(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Detach { conn, reply })
            .await
    }

    /// Runs a game command on behalf of `conn`.
    pub async fn act(&self, conn: ConnectionId, action: PlayerAction) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Act {
            conn,
            action,
            reply,
        })
        .await
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Info { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Tells the room to close. Participants receive a `410` error.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    session: QuizSession,
    idle_timeout: time::Duration,
    host_id: String,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs until the room closes, is shut down, or goes idle.
    async fn run(mut self) {
        let code = self.session.code().clone();
        info!(room = %code, quiz = %self.session.quiz().id, host_id = %self.host_id, "room actor started");

        let idle = time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    idle.as_mut().reset(Instant::now() + self.idle_timeout);
                    if !self.handle(cmd) {
                        break;
                    }
                }
                fired = self.session.timer().fired() => {
                    self.session.on_timer(fired);
                }
                () = &mut idle => {
                    self.session.abandon("Room closed after inactivity");
                    break;
                }
            }

            if self.session.phase() == SessionPhase::Closed {
                break;
            }
        }

        info!(room = %code, "room actor stopped");
    }

    /// Applies one command. Returns `false` on shutdown.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        debug!(room = %self.session.code(), command = ?cmd, "room command");
        match cmd {
            RoomCommand::AttachHost {
                conn,
                username,
                quiz_id,
                claim,
                sender,
                reply,
            } => {
                let result =
                    self.session
                        .attach_host(conn, &username, quiz_id.as_ref(), claim, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Join {
                conn,
                username,
                sender,
                reply,
            } => {
                let _ = reply.send(self.session.join_player(conn, &username, sender));
            }
            RoomCommand::Detach { conn, reply } => {
                let _ = reply.send(self.session.leave(conn));
            }
            RoomCommand::Act {
                conn,
                action,
                reply,
            } => {
                let result = self.apply(conn, action);
                if let Err(rejection) = &result {
                    debug!(room = %self.session.code(), %conn, %rejection, "command rejected");
                }
                let _ = reply.send(result);
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                self.session.abandon("Room was closed by the server");
                return false;
            }
        }
        true
    }

    fn apply(&mut self, conn: ConnectionId, action: PlayerAction) -> Result<(), Rejection> {
        match action {
            PlayerAction::Start => self.session.start(conn),
            PlayerAction::SubmitChoice(answer) => self.session.submit_choice(conn, answer),
            PlayerAction::SubmitText {
                text,
                question_index,
            } => self.session.submit_text(conn, &text, question_index),
            PlayerAction::Next => self.session.next(conn),
            PlayerAction::End => self.session.end(conn),
            PlayerAction::Snapshot => self.session.snapshot(conn),
        }
    }

    fn info(&self) -> RoomInfo {
        let quiz = self.session.quiz();
        RoomInfo {
            code: self.session.code().clone(),
            quiz_id: quiz.id.clone(),
            quiz_title: quiz.title.clone(),
            phase: self.session.phase(),
            player_count: self.session.player_count(),
            question_count: quiz.len(),
            host_attached: self.session.host_attached(),
            host_name: self.session.host_name().map(String::from),
            open_answers: self.session.open_answers().to_vec(),
        }
    }
}

/// Spawns a room actor for `quiz` and returns a handle to it.
///
/// `host_id` identifies who requested the room through the lobby API; it
/// is only logged.
pub(crate) fn spawn_room(
    code: RoomCode,
    quiz: Arc<Quiz>,
    config: RoomConfig,
    host_id: &str,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let idle_timeout = config.idle_timeout;

    let actor = RoomActor {
        session: QuizSession::new(code.clone(), quiz, config),
        idle_timeout,
        host_id: host_id.to_string(),
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
