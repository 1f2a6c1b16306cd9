//! The per-room quiz state machine.
//!
//! ```text
//! Waiting ──start──→ Preparing ──countdown──→ QuestionOpen
//!                        ↑                         │ deadline, or everyone answered
//!                        └──────next───── QuestionLocked ──next on last──→ Finished ──grace──→ Closed
//! ```
//!
//! [`QuizSession`] is synchronous and owned by exactly one room actor, so
//! every mutation is serialized by construction. Each command either
//! changes state and emits events through the [`Dispatcher`], or returns a
//! [`Rejection`] and changes nothing.

use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{
    PlayerId, PlayerSummary, QuestionKind, QuizId, RoomCode, ServerEvent, SessionPhase,
};
use quizhall_timer::{Fired, Scheduler, wall_clock_millis};
use quizhall_transport::ConnectionId;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{Dispatcher, EventSender, Recipient};
use crate::scoring::{self, Submission};
use crate::{Question, Quiz, Rejection, RoomConfig};

/// What the room's single timer is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Preparing → QuestionOpen.
    Countdown,
    /// QuestionOpen → QuestionLocked.
    QuestionDeadline,
    /// QuestionLocked → next question, when auto-advance is on.
    AutoAdvance,
    /// Finished → Closed.
    Closing,
}

/// How the host claimed the room. Decides the confirmation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClaim {
    /// `create_room`, answered with `room_created`.
    Create,
    /// `join_room` with `is_host: true`, answered with `room_joined`.
    Join,
}

/// An open-text answer kept for host review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAnswer {
    pub player_id: PlayerId,
    pub username: String,
    pub question_index: usize,
    pub text: String,
}

#[derive(Debug)]
struct Player {
    conn: ConnectionId,
    id: PlayerId,
    username: String,
    score: u32,
    has_answered: bool,
    last_answer: Option<Submission>,
}

impl Player {
    fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            username: self.username.clone(),
            score: self.score,
        }
    }
}

#[derive(Debug)]
struct HostSeat {
    conn: ConnectionId,
    username: String,
}

/// Authoritative state of one quiz room.
pub struct QuizSession {
    code: RoomCode,
    quiz: Arc<Quiz>,
    config: RoomConfig,
    phase: SessionPhase,
    host: Option<HostSeat>,
    players: Vec<Player>,
    current: usize,
    open_answers: Vec<OpenAnswer>,
    dispatcher: Dispatcher,
    timer: Scheduler<TimerKind>,
}

impl QuizSession {
    /// Creates a room in `Waiting` with no host attached.
    pub fn new(code: RoomCode, quiz: Arc<Quiz>, config: RoomConfig) -> Self {
        Self {
            code,
            quiz,
            config,
            phase: SessionPhase::Waiting,
            host: None,
            players: Vec::new(),
            current: 0,
            open_answers: Vec::new(),
            dispatcher: Dispatcher::new(),
            timer: Scheduler::new(),
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn host_attached(&self) -> bool {
        self.host.is_some()
    }

    /// Display name of the host, once attached.
    pub fn host_name(&self) -> Option<&str> {
        self.host.as_ref().map(|h| h.username.as_str())
    }

    /// What `player` submitted for the current question, if anything.
    pub fn last_answer(&self, player: PlayerId) -> Option<&Submission> {
        self.players
            .iter()
            .find(|p| p.id == player)
            .and_then(|p| p.last_answer.as_ref())
    }

    /// Zero-based index of the current (or upcoming) question.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Open-text answers collected so far, in arrival order.
    pub fn open_answers(&self) -> &[OpenAnswer] {
        &self.open_answers
    }

    /// Roster in join order, host excluded.
    pub fn roster(&self) -> Vec<PlayerSummary> {
        self.players.iter().map(Player::summary).collect()
    }

    /// Roster by descending score, ties in join order.
    pub fn standings(&self) -> Vec<PlayerSummary> {
        scoring::standings(self.roster())
    }

    /// The room timer. The actor polls it; the session arms and cancels it.
    pub fn timer(&mut self) -> &mut Scheduler<TimerKind> {
        &mut self.timer
    }

    // -- Membership --------------------------------------------------------

    /// Seats the host.
    ///
    /// # Errors
    /// Rejects a second host, a claim after the game started, or a claim
    /// for a different quiz than the room was created with.
    pub fn attach_host(
        &mut self,
        conn: ConnectionId,
        username: &str,
        quiz_id: Option<&QuizId>,
        claim: HostClaim,
        sender: EventSender,
    ) -> Result<(), Rejection> {
        self.ensure_open()?;
        if self.host.is_some() {
            return Err(Rejection::conflict("Room already has a host"));
        }
        if self.phase != SessionPhase::Waiting {
            return Err(Rejection::conflict("Game has already started"));
        }
        if quiz_id.is_some_and(|id| *id != self.quiz.id) {
            return Err(Rejection::validation("Quiz does not match this room"));
        }
        let username = self.validate_username(username)?;

        info!(room = %self.code, %conn, %username, "host attached");
        self.dispatcher.register(conn, sender);
        self.host = Some(HostSeat { conn, username });

        let confirmation = match claim {
            HostClaim::Create => ServerEvent::RoomCreated {
                is_host: true,
                room_code: self.code.clone(),
            },
            HostClaim::Join => ServerEvent::RoomJoined {
                is_host: true,
                room_code: self.code.clone(),
            },
        };
        self.dispatcher.notify(conn, confirmation);
        self.dispatcher.notify(
            conn,
            ServerEvent::PlayerJoined {
                players: self.roster(),
            },
        );
        Ok(())
    }

    /// Adds a player to the roster.
    ///
    /// # Errors
    /// Rejects joins before the host arrived, after the game started,
    /// into a full room, or with an invalid or taken username.
    pub fn join_player(
        &mut self,
        conn: ConnectionId,
        username: &str,
        sender: EventSender,
    ) -> Result<PlayerId, Rejection> {
        self.ensure_open()?;
        if self.host.is_none() {
            return Err(Rejection::conflict(
                "Room exists but host has not started the session yet",
            ));
        }
        if !self.phase.accepts_joins() {
            return Err(Rejection::conflict("Game has already started"));
        }
        if self.is_host(conn) || self.player_index(conn).is_some() {
            return Err(Rejection::conflict("Already in this room"));
        }
        let username = self.validate_username(username)?;
        if self
            .players
            .iter()
            .any(|p| p.username.to_lowercase() == username.to_lowercase())
        {
            return Err(Rejection::conflict("Username already taken in this room"));
        }
        if self.players.len() >= self.config.max_players {
            return Err(Rejection::conflict("Room is full"));
        }

        let id = PlayerId(conn.into_inner());
        self.players.push(Player {
            conn,
            id,
            username: username.clone(),
            score: 0,
            has_answered: false,
            last_answer: None,
        });
        self.dispatcher.register(conn, sender);
        info!(
            room = %self.code,
            %conn,
            player_id = %id,
            %username,
            players = self.players.len(),
            "player joined"
        );

        self.dispatcher.notify(
            conn,
            ServerEvent::RoomJoined {
                is_host: false,
                room_code: self.code.clone(),
            },
        );
        self.dispatcher.broadcast(ServerEvent::PlayerJoined {
            players: self.roster(),
        });
        Ok(id)
    }

    /// Removes a connection from the room.
    ///
    /// A departing host abandons the room. A departing player counts as a
    /// non-answer; if everyone left has answered, the question locks.
    ///
    /// # Errors
    /// Returns a not-found rejection if `conn` is not in the room.
    pub fn leave(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
        if self.is_host(conn) {
            info!(room = %self.code, %conn, "host left");
            self.dispatcher.unregister(conn);
            self.host = None;
            self.abandon("Host left the room");
            return Ok(());
        }

        let index = self
            .player_index(conn)
            .ok_or_else(|| Rejection::not_found("Not in this room"))?;
        let player = self.players.remove(index);
        self.dispatcher.unregister(conn);
        info!(
            room = %self.code,
            %conn,
            player_id = %player.id,
            players = self.players.len(),
            "player left"
        );
        self.dispatcher
            .broadcast(ServerEvent::PlayerLeft { user_id: player.id });

        if self.phase == SessionPhase::QuestionOpen {
            self.send_host_tally();
            if self.all_answered() {
                self.lock();
            }
        }
        Ok(())
    }

    // -- Host commands -----------------------------------------------------

    /// Starts the game.
    ///
    /// # Errors
    /// Host only, from `Waiting`, with at least one player.
    pub fn start(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
        self.require_host(conn, "Only the host can start the game")?;
        if self.phase != SessionPhase::Waiting {
            return Err(Rejection::violation("Game has already started"));
        }
        if self.players.is_empty() {
            return Err(Rejection::validation(
                "At least one player is needed to start the game",
            ));
        }

        info!(
            room = %self.code,
            quiz = %self.quiz.id,
            players = self.players.len(),
            questions = self.quiz.len(),
            "game started"
        );
        self.current = 0;
        self.dispatcher.broadcast(ServerEvent::GameStarted {});
        self.enter_preparing();
        Ok(())
    }

    /// Advances past a locked question.
    ///
    /// # Errors
    /// Host only, from `QuestionLocked`.
    pub fn next(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
        self.require_host(conn, "Only the host can advance the game")?;
        match self.phase {
            SessionPhase::QuestionLocked => {
                self.advance();
                Ok(())
            }
            SessionPhase::QuestionOpen => {
                Err(Rejection::violation("The current question is still open"))
            }
            phase => Err(Rejection::violation(format!(
                "Cannot advance while the room is {phase}"
            ))),
        }
    }

    /// Ends the game early and broadcasts the final standings.
    ///
    /// # Errors
    /// Host only, from any phase before `Finished`.
    pub fn end(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
        self.require_host(conn, "Only the host can end the game")?;
        if self.phase.is_terminal() {
            return Err(Rejection::violation("Game is already over"));
        }
        info!(room = %self.code, phase = %self.phase, "game ended by host");
        self.finish();
        Ok(())
    }

    // -- Player commands ---------------------------------------------------

    /// Records a choice answer for the open question.
    ///
    /// A second answer to the same question is ignored without error.
    ///
    /// # Errors
    /// Rejects the host, non-members, answers outside `QuestionOpen`,
    /// answers to open-text questions, and out-of-range indices.
    pub fn submit_choice(&mut self, conn: ConnectionId, answer: i64) -> Result<(), Rejection> {
        let index = self.answering_player(conn)?;
        let question = self.current_question()?;
        if question.kind == QuestionKind::OpenText {
            return Err(Rejection::violation("This question expects a text answer"));
        }
        if self.players[index].has_answered {
            debug!(room = %self.code, %conn, question = self.current, "duplicate answer ignored");
            return Ok(());
        }
        let option_count = question.options().len();
        let choice = usize::try_from(answer)
            .ok()
            .filter(|i| *i < option_count)
            .ok_or_else(|| Rejection::validation("Answer index out of range"))?;

        let submission = Submission::Choice(choice);
        let elapsed = self.timer.elapsed().unwrap_or(Duration::ZERO);
        let outcome = scoring::score(&question, &submission, elapsed);
        let correct_answer = question.correct_answer_text().unwrap_or_default();

        let player = &mut self.players[index];
        player.score += outcome.points_awarded;
        player.has_answered = true;
        player.last_answer = Some(submission);
        let new_score = player.score;
        debug!(
            room = %self.code,
            player_id = %player.id,
            question = self.current,
            choice,
            correct = ?outcome.correct,
            "answer accepted"
        );

        self.dispatcher.notify(
            conn,
            ServerEvent::AnswerResult {
                is_correct: outcome.correct.unwrap_or(false),
                correct_answer,
                points: outcome.points_awarded,
                new_score,
            },
        );
        self.send_host_tally();
        if self.all_answered() {
            self.lock();
        }
        Ok(())
    }

    /// Records an open-text answer for host review.
    ///
    /// # Errors
    /// Rejects the host, non-members, answers outside `QuestionOpen`,
    /// answers to another question or to a choice question, and empty or
    /// oversized text.
    pub fn submit_text(
        &mut self,
        conn: ConnectionId,
        text: &str,
        question_index: usize,
    ) -> Result<(), Rejection> {
        let index = self.answering_player(conn)?;
        if question_index != self.current {
            return Err(Rejection::violation("Answer is for a different question"));
        }
        let question = self.current_question()?;
        if question.kind != QuestionKind::OpenText {
            return Err(Rejection::violation(
                "This question expects an option index",
            ));
        }
        if self.players[index].has_answered {
            debug!(room = %self.code, %conn, question = self.current, "duplicate answer ignored");
            return Ok(());
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::validation("Answer cannot be empty"));
        }
        if text.chars().count() > self.config.max_open_answer_len {
            return Err(Rejection::validation(format!(
                "Answer is longer than {} characters",
                self.config.max_open_answer_len
            )));
        }

        let submission = Submission::Text(text.to_string());
        let elapsed = self.timer.elapsed().unwrap_or(Duration::ZERO);
        scoring::score(&question, &submission, elapsed);

        let player = &mut self.players[index];
        player.has_answered = true;
        player.last_answer = Some(submission);
        let answer = OpenAnswer {
            player_id: player.id,
            username: player.username.clone(),
            question_index,
            text: text.to_string(),
        };
        debug!(room = %self.code, player_id = %answer.player_id, question = question_index, "open answer recorded");

        self.dispatcher
            .notify(conn, ServerEvent::OpenAnswerReceived { question_index });
        if let Some(host) = &self.host {
            self.dispatcher.notify(
                host.conn,
                ServerEvent::NewOpenAnswer {
                    username: answer.username.clone(),
                    answer: answer.text.clone(),
                    question_index,
                },
            );
        }
        self.open_answers.push(answer);
        self.send_host_tally();
        if self.all_answered() {
            self.lock();
        }
        Ok(())
    }

    /// Sends a [`ServerEvent::RoomSnapshot`] to `conn`.
    ///
    /// # Errors
    /// Returns a not-found rejection if `conn` is not in the room.
    pub fn snapshot(&self, conn: ConnectionId) -> Result<(), Rejection> {
        let is_host = self.is_host(conn);
        let player = self.player_index(conn).map(|i| &self.players[i]);
        if !is_host && player.is_none() {
            return Err(Rejection::not_found("Not in this room"));
        }

        let in_question = matches!(
            self.phase,
            SessionPhase::Preparing | SessionPhase::QuestionOpen | SessionPhase::QuestionLocked
        );
        let time_remaining_ms = (self.phase == SessionPhase::QuestionOpen)
            .then(|| self.timer.remaining())
            .flatten()
            .map(|d| d.as_millis() as u64);

        self.dispatcher.notify(
            conn,
            ServerEvent::RoomSnapshot {
                room_code: self.code.clone(),
                phase: self.phase,
                is_host,
                question_number: in_question.then_some(self.current + 1),
                total_questions: self.quiz.len(),
                time_remaining_ms,
                has_answered: player.is_some_and(|p| p.has_answered),
                players: self.standings(),
            },
        );
        Ok(())
    }

    // -- Timers ------------------------------------------------------------

    /// Reacts to the room timer. Stale firings, from an epoch that was
    /// superseded by a later arm or cancel, are ignored.
    pub fn on_timer(&mut self, fired: Fired<TimerKind>) {
        if !self.timer.is_current(fired.epoch) {
            trace!(room = %self.code, kind = ?fired.kind, epoch = %fired.epoch, "stale timer ignored");
            return;
        }
        if fired.late_by > Duration::from_millis(250) {
            warn!(room = %self.code, kind = ?fired.kind, late_ms = fired.late_by.as_millis() as u64, "timer fired late");
        }

        match (fired.kind, self.phase) {
            (TimerKind::Countdown, SessionPhase::Preparing) => self.open_question(),
            (TimerKind::QuestionDeadline, SessionPhase::QuestionOpen) => {
                debug!(room = %self.code, question = self.current, "question deadline reached");
                self.lock();
            }
            (TimerKind::AutoAdvance, SessionPhase::QuestionLocked) => self.advance(),
            (TimerKind::Closing, SessionPhase::Finished) => self.close(),
            (kind, phase) => {
                debug!(room = %self.code, ?kind, %phase, "timer does not apply to phase");
            }
        }
    }

    /// Closes the room on behalf of the server (idle timeout, shutdown).
    /// Every participant receives a `410` error.
    pub fn abandon(&mut self, reason: &str) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        info!(room = %self.code, phase = %self.phase, reason, "room abandoned");
        self.timer.cancel();
        self.transition(SessionPhase::Closed);
        self.dispatcher
            .broadcast(Rejection::closed(reason).to_event());
        self.dispatcher.clear();
    }

    // -- Transitions -------------------------------------------------------

    fn transition(&mut self, target: SessionPhase) {
        if !self.phase.can_transition_to(target) {
            warn!(room = %self.code, from = %self.phase, to = %target, "unexpected phase transition");
        }
        debug!(room = %self.code, from = %self.phase, to = %target, "phase changed");
        self.phase = target;
    }

    fn enter_preparing(&mut self) {
        self.transition(SessionPhase::Preparing);
        let countdown = self.config.preparing_countdown;
        self.dispatcher.broadcast(ServerEvent::PreparingNext {
            question_number: self.current + 1,
            countdown_ms: countdown.as_millis() as u64,
        });
        self.timer.arm(TimerKind::Countdown, countdown);
    }

    fn open_question(&mut self) {
        let quiz = Arc::clone(&self.quiz);
        let Some(question) = quiz.questions.get(self.current) else {
            warn!(room = %self.code, index = self.current, "question index past the end");
            self.finish();
            return;
        };

        self.transition(SessionPhase::QuestionOpen);
        for player in &mut self.players {
            player.has_answered = false;
            player.last_answer = None;
        }

        let time_limit = Duration::from_secs(u64::from(question.time_limit_secs));
        self.timer.arm(TimerKind::QuestionDeadline, time_limit);
        let time_remaining_ms = self
            .timer
            .remaining()
            .unwrap_or(time_limit)
            .as_millis() as u64;

        let options = question
            .kind
            .is_choice()
            .then(|| question.options().into_iter().map(String::from).collect());
        info!(room = %self.code, question = self.current, kind = ?question.kind, "question opened");
        self.dispatcher.broadcast(ServerEvent::NewQuestion {
            question_number: self.current + 1,
            total_questions: self.quiz.len(),
            question: question.text.clone(),
            options,
            time_limit: question.time_limit_secs,
            time_remaining_ms,
            start_time: wall_clock_millis(),
            kind: question.kind,
            points: question.points,
        });

        self.send_host_tally();
        if self.all_answered() {
            self.lock();
        }
    }

    /// QuestionOpen → QuestionLocked. A no-op in any other phase, so the
    /// deadline and the last answer can both trigger it safely.
    fn lock(&mut self) {
        if self.phase != SessionPhase::QuestionOpen {
            trace!(room = %self.code, phase = %self.phase, "lock skipped");
            return;
        }
        self.timer.cancel();
        self.transition(SessionPhase::QuestionLocked);

        let answered = self.players.iter().filter(|p| p.has_answered).count();
        info!(room = %self.code, question = self.current, answered, total = self.players.len(), "question locked");

        self.dispatcher.broadcast(ServerEvent::TimeUp {});
        let revealed = self
            .quiz
            .questions
            .get(self.current)
            .filter(|q| q.kind.is_choice())
            .map(|q| q.correct_answer_text().unwrap_or_default());
        if let Some(correct_answer) = revealed {
            self.dispatcher.broadcast(ServerEvent::AnswerRevealed {
                question_number: self.current + 1,
                correct_answer,
            });
        }
        self.dispatcher.broadcast(ServerEvent::UpdateScores {
            players: self.standings(),
        });

        if let Some(delay) = self.config.auto_advance {
            self.timer.arm(TimerKind::AutoAdvance, delay);
        }
    }

    fn advance(&mut self) {
        if self.current + 1 < self.quiz.len() {
            self.current += 1;
            self.enter_preparing();
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.timer.cancel();
        self.transition(SessionPhase::Finished);
        info!(room = %self.code, quiz = %self.quiz.id, "game finished");
        self.dispatcher.broadcast(ServerEvent::GameOver {
            players: self.standings(),
            quiz_id: self.quiz.id.clone(),
        });
        self.timer.arm(TimerKind::Closing, self.config.finished_grace);
    }

    fn close(&mut self) {
        self.timer.cancel();
        self.transition(SessionPhase::Closed);
        self.dispatcher.clear();
        info!(room = %self.code, "room closed");
    }

    // -- Helpers -----------------------------------------------------------

    fn ensure_open(&self) -> Result<(), Rejection> {
        if self.phase == SessionPhase::Closed {
            return Err(Rejection::closed("Room is closed"));
        }
        Ok(())
    }

    fn is_host(&self, conn: ConnectionId) -> bool {
        self.host.as_ref().is_some_and(|h| h.conn == conn)
    }

    fn require_host(&self, conn: ConnectionId, message: &str) -> Result<(), Rejection> {
        if self.is_host(conn) {
            Ok(())
        } else {
            Err(Rejection::forbidden(message))
        }
    }

    fn player_index(&self, conn: ConnectionId) -> Option<usize> {
        self.players.iter().position(|p| p.conn == conn)
    }

    /// The roster index of `conn` if it may answer right now.
    fn answering_player(&self, conn: ConnectionId) -> Result<usize, Rejection> {
        if self.is_host(conn) {
            return Err(Rejection::violation("The host cannot answer questions"));
        }
        let index = self
            .player_index(conn)
            .ok_or_else(|| Rejection::violation("Join the room before answering"))?;
        if !self.phase.accepts_answers() {
            return Err(Rejection::violation("No question is open"));
        }
        Ok(index)
    }

    fn current_question(&self) -> Result<Question, Rejection> {
        self.quiz
            .questions
            .get(self.current)
            .cloned()
            .ok_or_else(|| Rejection::violation("No question is open"))
    }

    fn all_answered(&self) -> bool {
        self.players.iter().all(|p| p.has_answered)
    }

    /// Live tally for the host while a question is open.
    fn send_host_tally(&self) {
        let Some(host) = &self.host else { return };
        self.dispatcher.dispatch(
            Recipient::Only(host.conn),
            ServerEvent::UpdateScores {
                players: self.standings(),
            },
        );
        self.dispatcher.notify(
            host.conn,
            ServerEvent::AnswerCount {
                answered: self.players.iter().filter(|p| p.has_answered).count(),
                total: self.players.len(),
            },
        );
    }

    fn validate_username(&self, raw: &str) -> Result<String, Rejection> {
        let username = raw.trim();
        if username.is_empty() {
            return Err(Rejection::validation("Username cannot be empty"));
        }
        if username.chars().count() > self.config.max_username_len {
            return Err(Rejection::validation(format!(
                "Username is longer than {} characters",
                self.config.max_username_len
            )));
        }
        Ok(username.to_string())
    }
}
