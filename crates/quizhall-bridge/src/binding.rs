//! The record of one connection's seat in one room.

use std::fmt;
use std::time::Instant;

use quizhall_protocol::{PlayerId, RoomCode};

/// The seat a connection occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Runs the quiz. Exactly one per room.
    Host,
    /// Answers questions.
    Player,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Player => f.write_str("player"),
        }
    }
}

/// Where a connection sits.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The room the connection joined.
    pub room: RoomCode,
    /// Host or player.
    pub role: Role,
    /// Name shown to the room.
    pub username: String,
    /// Identity inside the room.
    pub player_id: PlayerId,
    /// When the connection joined.
    pub bound_at: Instant,
}
