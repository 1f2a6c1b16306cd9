//! Room and registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room a registry spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Countdown between `preparing_next` and `new_question`.
    pub preparing_countdown: Duration,

    /// How long a finished room stays up so clients can render the final
    /// standings. The code is freed afterwards.
    pub finished_grace: Duration,

    /// A room that receives no command for this long is abandoned.
    pub idle_timeout: Duration,

    /// When set, a locked question advances on its own after this delay.
    /// `None` leaves advancement to the host.
    pub auto_advance: Option<Duration>,

    /// Roster cap, host excluded.
    pub max_players: usize,

    /// Longest accepted username, in characters.
    pub max_username_len: usize,

    /// Longest accepted open-text answer, in characters.
    pub max_open_answer_len: usize,

    /// Capacity of the room actor's command channel.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            preparing_countdown: Duration::from_secs(5),
            finished_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30 * 60),
            auto_advance: None,
            max_players: 200,
            max_username_len: 32,
            max_open_answer_len: 500,
            channel_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// How room codes are generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Characters per generated code.
    pub code_length: usize,

    /// Characters codes are drawn from. The default leaves out `0`, `O`,
    /// `1` and `I`, which people misread.
    pub alphabet: String,

    /// Collisions tolerated before `create_room` gives up.
    pub max_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            alphabet: "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".to_string(),
            max_attempts: 32,
        }
    }
}
