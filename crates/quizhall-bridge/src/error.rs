//! Error types for the bridge.

use quizhall_protocol::RoomCode;
use quizhall_transport::ConnectionId;

/// Errors raised when bindings are created or removed.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The connection has not joined any room.
    #[error("connection {0} is not in a room")]
    NotBound(ConnectionId),

    /// The connection already occupies a seat. A connection joins at most
    /// one room at a time and must leave before joining another.
    #[error("connection {0} is already in room {1}")]
    AlreadyBound(ConnectionId, RoomCode),
}
