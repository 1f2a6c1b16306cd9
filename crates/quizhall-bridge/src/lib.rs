//! Connection bindings for Quizhall.
//!
//! A connection is anonymous until it joins a room. From then on the
//! server needs to answer two questions quickly:
//!
//! 1. Which room (and which seat) does this connection belong to?
//! 2. Which connections belong to this room?
//!
//! [`ConnectionBridge`] answers both. It holds no sockets and no game
//! state; the room actor owns the latter.
//!
//! ```text
//! Connection handler (above)  ← looks up the binding for each frame
//!     ↕
//! Bridge (this crate)         ← ConnectionId ⇄ (RoomCode, Role)
//!     ↕
//! Protocol / Transport (below) ← RoomCode, PlayerId, ConnectionId
//! ```

mod binding;
mod bridge;
mod error;

pub use binding::{Binding, Role};
pub use bridge::{ConnectionBridge, player_id_for};
pub use error::BridgeError;
