//! # Quizhall
//!
//! A real-time quiz session server.
//!
//! A host allocates a room for a quiz over the lobby HTTP API, then host
//! and players connect over WebSocket and join by room code. Each room
//! runs as its own actor: it owns the quiz, the roster, the scores, and
//! the question deadlines, and pushes every state change to its clients.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizhall::prelude::*;
//!
//! # async fn demo() -> Result<(), QuizhallError> {
//! let quizzes = InMemoryQuizStore::from_json(r#"[]"#)?;
//! let server = QuizServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .http("0.0.0.0:8081")
//!     .build(quizzes)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
pub mod http;
mod lobby;
mod server;

pub use error::QuizhallError;
pub use lobby::{CreatedRoom, Lobby, RoomSummary};
pub use server::{QuizServer, QuizServerBuilder, ServerConfig};

/// Everything needed to run a server and talk to it.
pub mod prelude {
    pub use crate::{
        CreatedRoom, Lobby, QuizServer, QuizServerBuilder, QuizhallError, RoomSummary,
        ServerConfig,
    };
    pub use quizhall_protocol::{
        ClientEvent, Envelope, NoData, PROTOCOL_VERSION, PlayerId, PlayerSummary, QuestionKind,
        QuizId, RoomCode, ServerEvent, SessionPhase,
    };
    pub use quizhall_room::{
        CorrectAnswer, InMemoryQuizStore, Question, Quiz, QuizStore, RegistryConfig, RoomConfig,
        StoreError,
    };
}
