//! Quiz rooms for Quizhall.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! room's [`QuizSession`]. Rooms share nothing but the registry lookup.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms under unique codes, finds them again
//! - [`RoomHandle`]: sends commands to a running room actor
//! - [`QuizSession`]: the per-room state machine
//! - [`Quiz`] / [`QuizStore`]: quiz content and where it comes from
//! - [`score`]: correctness and points for one submission
//! - [`Dispatcher`]: ordered fan-out of events to a room's connections

mod config;
mod dispatch;
mod error;
mod quiz;
mod registry;
mod room;
mod scoring;
mod session;
mod store;

pub use config::{RegistryConfig, RoomConfig};
pub use dispatch::{Dispatcher, EventSender, Recipient};
pub use error::{Rejection, RejectionKind, RoomError};
pub use quiz::{CorrectAnswer, Question, Quiz, QuizError};
pub use registry::RoomRegistry;
pub use room::{PlayerAction, RoomHandle, RoomInfo};
pub use scoring::{ScoreOutcome, Submission, score, standings};
pub use session::{HostClaim, OpenAnswer, QuizSession, TimerKind};
pub use store::{InMemoryQuizStore, QuizStore, StoreError};
