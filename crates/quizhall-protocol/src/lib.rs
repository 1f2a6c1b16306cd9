//! Wire protocol for Quizhall.
//!
//! - **Types** ([`Envelope`], [`RoomCode`], [`SessionPhase`], ...): values
//!   shared by every layer.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): the closed vocabulary
//!   of a quiz connection.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, envelopes out.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientEvent>) → Room engine
//! ```
//!
//! This crate knows nothing about sockets or rooms.

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, NoData, ServerEvent};
pub use types::{
    Envelope, PROTOCOL_VERSION, PlayerId, PlayerSummary, QuestionKind, QuizId, RoomCode,
    SessionPhase,
};
