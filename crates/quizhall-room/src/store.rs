//! Access to quiz content.
//!
//! Quizzes live in an external authoring service. Rooms only ever see
//! them through [`QuizStore`], once, at creation time.

use std::collections::HashMap;
use std::future::Future;

use quizhall_protocol::QuizId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Quiz;

/// Errors from a quiz store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No quiz with this id.
    #[error("quiz {0} not found")]
    NotFound(QuizId),

    /// The backing service failed.
    #[error("quiz store unavailable: {0}")]
    Unavailable(String),

    /// Quiz data could not be parsed.
    #[error("malformed quiz data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read-only access to quizzes.
///
/// Implement this for whatever backs the authoring service (an HTTP API,
/// a database). The server calls [`fetch`](Self::fetch) once per room.
///
/// # Example
///
/// ```rust
/// use quizhall_protocol::QuizId;
/// use quizhall_room::{Quiz, QuizStore, StoreError};
///
/// struct NoQuizzes;
///
/// impl QuizStore for NoQuizzes {
///     async fn fetch(&self, id: &QuizId) -> Result<Quiz, StoreError> {
///         Err(StoreError::NotFound(id.clone()))
///     }
/// }
/// ```
pub trait QuizStore: Send + Sync + 'static {
    /// Loads one quiz.
    fn fetch(&self, id: &QuizId) -> impl Future<Output = Result<Quiz, StoreError>> + Send;
}

/// A [`QuizStore`] held in memory. Used by tests and the demo server.
#[derive(Debug, Default)]
pub struct InMemoryQuizStore {
    quizzes: RwLock<HashMap<QuizId, Quiz>>,
}

impl InMemoryQuizStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `quizzes`.
    pub fn from_quizzes(quizzes: impl IntoIterator<Item = Quiz>) -> Self {
        let map = quizzes.into_iter().map(|q| (q.id.clone(), q)).collect();
        Self {
            quizzes: RwLock::new(map),
        }
    }

    /// Parses a JSON array of quizzes.
    ///
    /// # Errors
    /// Returns [`StoreError::Malformed`] if the document is not a list of
    /// quizzes. Quizzes are not validated here; rooms validate on creation.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let quizzes: Vec<Quiz> = serde_json::from_str(json)?;
        Ok(Self::from_quizzes(quizzes))
    }

    /// Adds or replaces a quiz. Rooms already created keep their copy.
    pub async fn insert(&self, quiz: Quiz) {
        debug!(quiz = %quiz.id, "quiz stored");
        self.quizzes.write().await.insert(quiz.id.clone(), quiz);
    }

    /// Number of quizzes held.
    pub async fn len(&self) -> usize {
        self.quizzes.read().await.len()
    }

    /// Returns `true` if the store holds no quizzes.
    pub async fn is_empty(&self) -> bool {
        self.quizzes.read().await.is_empty()
    }
}

impl QuizStore for InMemoryQuizStore {
    async fn fetch(&self, id: &QuizId) -> Result<Quiz, StoreError> {
        self.quizzes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
