//! Error types for the room layer.

use std::fmt;

use quizhall_protocol::{RoomCode, ServerEvent};

use crate::{QuizError, StoreError};

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Category of a rejected client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// The command does not fit the room's current phase.
    ProtocolViolation,
    /// Unknown room, or the sender is not in it.
    NotFound,
    /// Malformed values: empty username, answer index out of range.
    Validation,
    /// Only the host may do this.
    Forbidden,
    /// Clashes with existing state: duplicate username, full room.
    Conflict,
    /// The room is gone.
    Closed,
}

impl RejectionKind {
    /// HTTP-style status carried in the `error` event.
    pub fn code(self) -> u16 {
        match self {
            Self::ProtocolViolation | Self::Validation => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Closed => 410,
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProtocolViolation => "protocol violation",
            Self::NotFound => "not found",
            Self::Validation => "validation",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A client command the room refused. Sent back to the originator as
/// exactly one `error` event; room state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn violation(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::ProtocolViolation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::Validation, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::Conflict, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(RejectionKind::Closed, message)
    }

    /// The HTTP-style status code.
    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// The `error` event for the originator.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.code(), self.message.clone())
    }
}

// ---------------------------------------------------------------------------
// RoomError
// ---------------------------------------------------------------------------

/// Errors from room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No open room has this code.
    #[error("room {0:?} not found")]
    NotFound(String),

    /// Every generated code collided with an open room.
    #[error("no free room code after {attempts} attempts")]
    RegistryExhausted { attempts: u32 },

    /// A room with this code is already open.
    #[error("room code {0} is already in use")]
    CodeInUse(RoomCode),

    /// The room actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// The room refused the command.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The quiz cannot be played.
    #[error("invalid quiz: {0}")]
    InvalidQuiz(#[from] QuizError),

    /// The quiz could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// What to tell the client that triggered this error.
    pub fn to_rejection(&self) -> Rejection {
        match self {
            Self::NotFound(_) => Rejection::not_found("Room not found"),
            Self::Unavailable(_) => Rejection::closed("Room is closed"),
            Self::Rejected(rejection) => rejection.clone(),
            Self::CodeInUse(_) => Rejection::conflict(self.to_string()),
            Self::RegistryExhausted { .. } | Self::InvalidQuiz(_) | Self::Store(_) => {
                Rejection::validation(self.to_string())
            }
        }
    }
}
