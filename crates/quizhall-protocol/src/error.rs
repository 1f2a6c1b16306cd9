//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown event, or a
    /// payload that does not match the event's shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame was written for a protocol version this server does not speak.
    #[error("unsupported protocol version {got} (expected {expected})")]
    UnsupportedVersion {
        /// Version the server speaks.
        expected: u32,
        /// Version the client announced.
        got: u32,
    },

    /// A room code that can never name a room (empty, too long, or
    /// containing characters outside `[A-Za-z0-9]`).
    #[error("invalid room code {0:?}")]
    InvalidRoomCode(String),
}
