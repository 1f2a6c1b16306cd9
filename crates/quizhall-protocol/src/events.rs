//! The closed set of events exchanged on a quiz connection.
//!
//! Both enums are adjacently tagged: `{ "event": "<name>", "data": { ... } }`.
//! Anything that does not decode into one of these variants is a protocol
//! violation, never a crash.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{PlayerId, PlayerSummary, QuestionKind, QuizId, RoomCode, SessionPhase};

/// Client → server events.
///
/// Room codes arrive as raw strings; the server normalizes them with
/// [`RoomCode::parse`] so a malformed code is reported like an unknown room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room as a player, or claim it as host with `is_host: true`.
    JoinRoom {
        username: String,
        room_code: String,
        #[serde(default)]
        is_host: bool,
    },

    /// Host claims a room allocated through the lobby API.
    CreateRoom {
        username: String,
        quiz_id: QuizId,
        room_code: String,
    },

    /// Host starts the game.
    StartGame { room_code: String },

    /// Player answers the open choice question with an option index.
    SubmitAnswer { answer: i64 },

    /// Player answers the open text question.
    SubmitOpenAnswer {
        answer_text: String,
        question_index: usize,
    },

    /// Host advances past a locked question.
    NextQuestion { room_code: String },

    /// Host ends the game early.
    EndGame { room_code: String },

    /// Leave the current room without closing the connection.
    LeaveRoom(NoData),

    /// Ask for a full description of the room as it is now.
    RequestSnapshot(NoData),

    /// Keep-alive carrying the client clock for offset estimation.
    Heartbeat { client_time: u64 },
}

impl ClientEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::CreateRoom { .. } => "create_room",
            Self::StartGame { .. } => "start_game",
            Self::SubmitAnswer { .. } => "submit_answer",
            Self::SubmitOpenAnswer { .. } => "submit_open_answer",
            Self::NextQuestion { .. } => "next_question",
            Self::EndGame { .. } => "end_game",
            Self::LeaveRoom(_) => "leave_room",
            Self::RequestSnapshot(_) => "request_snapshot",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Payload of a client event that carries no fields.
///
/// Serializes as `{}`. On input `data` may be `{}`, `null`, or left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoData {}

impl<'de> Deserialize<'de> for NoData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<IgnoredAny>::deserialize(deserializer).map(|_| NoData {})
    }
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The sender joined a room.
    RoomJoined { is_host: bool, room_code: RoomCode },

    /// The sender claimed a room as host via `create_room`.
    RoomCreated { is_host: bool, room_code: RoomCode },

    /// The roster changed. Host excluded, insertion order.
    PlayerJoined { players: Vec<PlayerSummary> },

    /// A player left the room.
    PlayerLeft { user_id: PlayerId },

    /// The host started the game.
    GameStarted {},

    /// A countdown to the next question began.
    PreparingNext {
        question_number: usize,
        countdown_ms: u64,
    },

    /// A question is open for answers.
    ///
    /// `time_remaining_ms` is computed by the server when the event is
    /// built; clients resynchronize their countdown from it.
    NewQuestion {
        question_number: usize,
        total_questions: usize,
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        time_limit: u32,
        time_remaining_ms: u64,
        start_time: u64,
        #[serde(rename = "type")]
        kind: QuestionKind,
        points: u32,
    },

    /// Host only: a player submitted an open-text answer.
    NewOpenAnswer {
        username: String,
        answer: String,
        question_index: usize,
    },

    /// Submitter only: the open-text answer was recorded.
    OpenAnswerReceived { question_index: usize },

    /// Host only: live answer tally.
    AnswerCount { answered: usize, total: usize },

    /// The open question locked.
    TimeUp {},

    /// The correct answer of the question that just locked.
    AnswerRevealed {
        question_number: usize,
        correct_answer: String,
    },

    /// Submitter only: outcome of a choice answer.
    AnswerResult {
        is_correct: bool,
        correct_answer: String,
        points: u32,
        new_score: u32,
    },

    /// Scoreboard, highest score first.
    UpdateScores { players: Vec<PlayerSummary> },

    /// Final standings, highest score first, ties in join order.
    GameOver {
        players: Vec<PlayerSummary>,
        quiz_id: QuizId,
    },

    /// Point-in-time view of the room for a (re)joining client.
    RoomSnapshot {
        room_code: RoomCode,
        phase: SessionPhase,
        is_host: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question_number: Option<usize>,
        total_questions: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_remaining_ms: Option<u64>,
        has_answered: bool,
        players: Vec<PlayerSummary>,
    },

    /// Reply to a heartbeat.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A command was rejected. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}

impl ServerEvent {
    /// Convenience constructor for [`ServerEvent::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomCreated { .. } => "room_created",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::GameStarted {} => "game_started",
            Self::PreparingNext { .. } => "preparing_next",
            Self::NewQuestion { .. } => "new_question",
            Self::NewOpenAnswer { .. } => "new_open_answer",
            Self::OpenAnswerReceived { .. } => "open_answer_received",
            Self::AnswerCount { .. } => "answer_count",
            Self::TimeUp {} => "time_up",
            Self::AnswerRevealed { .. } => "answer_revealed",
            Self::AnswerResult { .. } => "answer_result",
            Self::UpdateScores { .. } => "update_scores",
            Self::GameOver { .. } => "game_over",
            Self::RoomSnapshot { .. } => "room_snapshot",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::Error { .. } => "error",
        }
    }
}
