//! Identity types, shared value types, and the frame envelope.
//!
//! Everything here travels on the wire, so the serde attributes are part
//! of the public contract. The tests at the bottom pin the JSON shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The protocol version this build speaks. Frames that announce a
/// different `v` are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's identity inside one room.
///
/// Derived from the connection, so it is ephemeral: a client that
/// reconnects and joins again gets a new `PlayerId`.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identifier of a quiz in the external authoring store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizId(pub String);

impl QuizId {
    /// Creates a quiz id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuizId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A human-typeable room code.
///
/// Codes are case-insensitive and typed by people, so parsing trims
/// surrounding whitespace and uppercases. Two codes are equal iff their
/// normalized forms are equal.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Longest code accepted from clients.
    pub const MAX_LEN: usize = 12;

    /// Normalizes and validates raw client input.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty()
            || normalized.len() > Self::MAX_LEN
            || !normalized.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ProtocolError::InvalidRoomCode(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Shared value types
// ---------------------------------------------------------------------------

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick one of 2–4 options.
    SingleChoice,
    /// Pick one of two options.
    TrueFalse,
    /// Free text, collected for the host and never auto-scored.
    OpenText,
}

impl QuestionKind {
    /// Returns `true` for question kinds answered by option index.
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::TrueFalse)
    }
}

/// The lifecycle phase of a quiz room.
///
/// ```text
/// Waiting → Preparing → QuestionOpen → QuestionLocked ─┬→ Preparing
///                                                       └→ Finished → Closed
/// ```
///
/// Any non-terminal phase may also jump to `Finished` (host ends the game)
/// or `Closed` (host left, idle timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Lobby: players join, the host waits to start.
    Waiting,
    /// Countdown before a question is revealed. No answers accepted.
    Preparing,
    /// A question is live and accepting one answer per player.
    QuestionOpen,
    /// The question closed; results are shown until the host advances.
    QuestionLocked,
    /// Final standings were broadcast; the room closes after a grace period.
    Finished,
    /// The room is gone. Terminal.
    Closed,
}

impl SessionPhase {
    /// Returns `true` if new players may join.
    pub fn accepts_joins(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if answers are accepted.
    pub fn accepts_answers(self) -> bool {
        matches!(self, Self::QuestionOpen)
    }

    /// Returns `true` once the game has run its course.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Closed)
    }

    /// Returns `true` if moving from `self` to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionPhase::*;
        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Finished, _) => false,
            (_, Finished) => true,
            (Waiting, Preparing)
            | (Preparing, QuestionOpen)
            | (QuestionOpen, QuestionLocked)
            | (QuestionLocked, Preparing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Preparing => "preparing",
            Self::QuestionOpen => "question_open",
            Self::QuestionLocked => "question_locked",
            Self::Finished => "finished",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One row of a roster or scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// The player's connection-scoped id.
    pub id: PlayerId,
    /// Display name, unique within the room.
    pub username: String,
    /// Accumulated points.
    pub score: u32,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// The frame wrapper. Every message on the wire is an `Envelope`.
///
/// ```text
/// { "v": 1, "seq": 7, "timestamp": 1760000000000,
///   "payload": { "event": "submit_answer", "data": { "answer": 2 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version. Defaults to [`PROTOCOL_VERSION`] when absent.
    #[serde(default = "default_version")]
    pub v: u32,

    /// Per-direction sequence number.
    #[serde(default)]
    pub seq: u64,

    /// Sender wall clock in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,

    /// The event itself.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload with the current protocol version.
    pub fn new(seq: u64, timestamp: u64, payload: T) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            seq,
            timestamp,
            payload,
        }
    }

    /// Rejects frames from a different protocol version.
    pub fn check_version(&self) -> Result<(), ProtocolError> {
        if self.v == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: self.v,
            })
        }
    }
}
