//! Unified error type for the Quizhall server.

use quizhall_bridge::BridgeError;
use quizhall_protocol::ProtocolError;
use quizhall_room::{RoomError, StoreError};
use quizhall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizhallError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, version).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A binding-level error (already bound, not bound).
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A room-level error (not found, exhausted, rejected, store).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The quiz store could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Binding the lobby HTTP listener or reading a file failed.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: QuizhallError = err.into();
        assert!(matches!(err, QuizhallError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidRoomCode("??".into());
        let err: QuizhallError = err.into();
        assert!(matches!(err, QuizhallError::Protocol(_)));
    }

    #[test]
    fn test_from_bridge_error() {
        let err = BridgeError::NotBound(quizhall_transport::ConnectionId::new(4));
        let err: QuizhallError = err.into();
        assert!(matches!(err, QuizhallError::Bridge(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err: QuizhallError = RoomError::NotFound("ZZZZ".into()).into();
        assert!(matches!(err, QuizhallError::Room(_)));
        assert!(err.to_string().contains("ZZZZ"));
    }

    #[test]
    fn test_from_store_error() {
        let err: QuizhallError = StoreError::Unavailable("offline".into()).into();
        assert!(matches!(err, QuizhallError::Store(_)));
    }
}
