//! The lobby: room allocation, lookup, and connection bookkeeping shared
//! by the WebSocket handler and the HTTP API.
//!
//! Lock order: never hold `rooms` and `bridge` at the same time, and never
//! hold either across a room request.

use std::sync::Arc;

use quizhall_bridge::{Binding, BridgeError, ConnectionBridge, Role};
use quizhall_protocol::{QuizId, RoomCode, SessionPhase};
use quizhall_room::{
    QuizStore, RegistryConfig, RoomConfig, RoomError, RoomHandle, RoomInfo, RoomRegistry,
    Rejection,
};
use quizhall_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Result of allocating a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRoom {
    pub room_code: RoomCode,
    pub quiz_title: String,
}

/// What a client may learn about a room before joining it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub room_code: RoomCode,
    pub quiz_id: QuizId,
    pub quiz_title: String,
    pub phase: SessionPhase,
    pub player_count: usize,
    pub question_count: usize,
    pub host_connected: bool,
    /// Connections currently bound to the room, host included.
    pub connections: usize,
}

/// Shared server state: the room registry, the connection bridge, and the
/// quiz store.
pub struct Lobby<Q> {
    rooms: Mutex<RoomRegistry>,
    bridge: Mutex<ConnectionBridge>,
    quizzes: Q,
}

impl<Q: QuizStore> Lobby<Q> {
    /// Creates a lobby with no rooms.
    pub fn new(quizzes: Q, registry: RegistryConfig, room: RoomConfig) -> Self {
        Self {
            rooms: Mutex::new(RoomRegistry::new(registry, room)),
            bridge: Mutex::new(ConnectionBridge::new()),
            quizzes,
        }
    }

    /// The quiz store rooms are created from.
    pub fn quizzes(&self) -> &Q {
        &self.quizzes
    }

    /// Allocates a room for `quiz_id` on behalf of `host_id`.
    ///
    /// The quiz is fetched once here and never again for this room.
    ///
    /// # Errors
    /// - [`RoomError::Store`] if the quiz cannot be fetched.
    /// - [`RoomError::InvalidQuiz`] if it cannot be played.
    /// - [`RoomError::RegistryExhausted`] if no free code was found.
    pub async fn create_room(
        &self,
        quiz_id: &QuizId,
        host_id: &str,
    ) -> Result<CreatedRoom, RoomError> {
        let quiz = self.quizzes.fetch(quiz_id).await?;
        quiz.validate()?;
        let quiz_title = quiz.title.clone();

        let (room_code, pruned) = {
            let mut rooms = self.rooms.lock().await;
            let pruned = rooms.prune_closed();
            let code = rooms.create_room(Arc::new(quiz), host_id)?;
            (code, pruned)
        };
        self.release_rooms(&pruned).await;

        Ok(CreatedRoom {
            room_code,
            quiz_title,
        })
    }

    /// Describes an open room. Case-insensitive; whitespace is ignored.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] for unknown or closed rooms.
    pub async fn lookup_room(&self, raw: &str) -> Result<RoomSummary, RoomError> {
        let handle = self.find(raw).await?;
        let info = handle
            .info()
            .await
            .map_err(|_| RoomError::NotFound(raw.to_string()))?;
        let connections = self.bridge.lock().await.connections_in(&info.code).len();
        Ok(RoomSummary::from_info(info, connections))
    }

    /// Number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.room_count()
    }

    /// Number of connections seated in some room.
    pub async fn connection_count(&self) -> usize {
        self.bridge.lock().await.len()
    }

    /// Closes every open room. Participants receive a `410` error.
    pub async fn close_all(&self) {
        let handles = self.rooms.lock().await.list();
        for handle in &handles {
            if let Err(e) = handle.shutdown().await {
                debug!(room = %handle.code(), error = %e, "room already stopped");
            }
        }
        let mut bridge = self.bridge.lock().await;
        for handle in &handles {
            bridge.release_room(handle.code());
        }
        info!(rooms = handles.len(), "all rooms closed");
    }

    /// Looks up an open room, dropping the bindings of rooms that closed
    /// since the last lookup.
    pub(crate) async fn find(&self, raw: &str) -> Result<RoomHandle, RoomError> {
        let (found, pruned) = {
            let mut rooms = self.rooms.lock().await;
            let pruned = rooms.prune_closed();
            (rooms.find_room(raw), pruned)
        };
        self.release_rooms(&pruned).await;
        found
    }

    /// The room `conn` is bound to, resolved through its binding.
    ///
    /// # Errors
    /// - [`RoomError::Rejected`] (400) if the connection is in no room.
    /// - [`RoomError::Unavailable`] if its room has closed.
    pub(crate) async fn resolve(
        &self,
        conn: ConnectionId,
    ) -> Result<(RoomHandle, Binding), RoomError> {
        let binding = self
            .bridge
            .lock()
            .await
            .require(conn)
            .cloned()
            .map_err(|_| Rejection::violation("Join a room first"))?;
        match self.find(binding.room.as_str()).await {
            Ok(handle) => Ok((handle, binding)),
            Err(_) => {
                self.unbind(conn).await;
                Err(RoomError::Unavailable(binding.room))
            }
        }
    }

    /// Drops the binding of `conn` and takes it out of its room.
    pub(crate) async fn release(&self, conn: ConnectionId) -> Option<Binding> {
        let binding = match self.bridge.lock().await.unbind(conn) {
            Ok(binding) => binding,
            Err(e) => {
                debug!(%conn, error = %e, "release skipped");
                return None;
            }
        };
        if let Ok(handle) = self.find(binding.room.as_str()).await {
            if let Err(e) = handle.detach(conn).await {
                debug!(%conn, room = %binding.room, error = %e, "detach failed");
            }
        }
        info!(
            %conn,
            room = %binding.room,
            role = %binding.role,
            player = ?binding.player_id,
            seated_for = ?binding.bound_at.elapsed(),
            "connection left room"
        );
        Some(binding)
    }

    async fn release_rooms(&self, codes: &[RoomCode]) {
        if codes.is_empty() {
            return;
        }
        let mut bridge = self.bridge.lock().await;
        for code in codes {
            bridge.release_room(code);
        }
    }

    pub(crate) async fn bind(
        &self,
        conn: ConnectionId,
        room: RoomCode,
        role: Role,
        username: &str,
    ) -> Result<(), BridgeError> {
        self.bridge
            .lock()
            .await
            .bind(conn, room, role, username)
            .map(|_| ())
    }

    pub(crate) async fn unbind(&self, conn: ConnectionId) {
        // Bindings of closed rooms may already have been released.
        if let Err(e) = self.bridge.lock().await.unbind(conn) {
            debug!(%conn, error = %e, "unbind skipped");
        }
    }
}

impl RoomSummary {
    fn from_info(info: RoomInfo, connections: usize) -> Self {
        Self {
            room_code: info.code,
            quiz_id: info.quiz_id,
            quiz_title: info.quiz_title,
            phase: info.phase,
            player_count: info.player_count,
            question_count: info.question_count,
            host_connected: info.host_attached,
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizhall_protocol::QuestionKind;
    use quizhall_room::{CorrectAnswer, InMemoryQuizStore, Question, Quiz, StoreError};

    fn store() -> InMemoryQuizStore {
        InMemoryQuizStore::from_quizzes([
            Quiz {
                id: QuizId::new("geo"),
                title: "Geography".into(),
                questions: vec![Question {
                    text: "Capital of France?".into(),
                    kind: QuestionKind::SingleChoice,
                    options: vec!["London".into(), "Paris".into()],
                    correct_answer: Some(CorrectAnswer::Index(1)),
                    time_limit_secs: 20,
                    points: 10,
                }],
            },
            Quiz {
                id: QuizId::new("empty"),
                title: "Nothing yet".into(),
                questions: vec![],
            },
        ])
    }

    fn lobby() -> Lobby<InMemoryQuizStore> {
        Lobby::new(store(), RegistryConfig::default(), RoomConfig::default())
    }

    #[tokio::test]
    async fn test_create_then_lookup() {
        let lobby = lobby();
        let created = lobby.create_room(&QuizId::new("geo"), "host-1").await.unwrap();
        assert_eq!(created.quiz_title, "Geography");

        let lower = created.room_code.as_str().to_lowercase();
        let summary = lobby.lookup_room(&format!(" {lower} ")).await.unwrap();
        assert_eq!(summary.room_code, created.room_code);
        assert_eq!(summary.phase, SessionPhase::Waiting);
        assert_eq!(summary.question_count, 1);
        assert!(!summary.host_connected);
        assert_eq!(summary.connections, 0);
        assert_eq!(lobby.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_quiz_and_invalid_quiz() {
        let lobby = lobby();
        let err = lobby
            .create_room(&QuizId::new("nope"), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Store(StoreError::NotFound(_))));

        let err = lobby
            .create_room(&QuizId::new("empty"), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidQuiz(_)));
        assert_eq!(lobby.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_unknown_room() {
        let lobby = lobby();
        assert!(matches!(
            lobby.lookup_room("ZZZZZZ").await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_once_per_connection() {
        let lobby = lobby();
        let conn = ConnectionId::new(9);
        let code = RoomCode::parse("ABCD").unwrap();
        lobby.bind(conn, code.clone(), Role::Player, "Alice").await.unwrap();
        assert!(matches!(
            lobby.bind(conn, code, Role::Player, "Alice").await,
            Err(BridgeError::AlreadyBound(..))
        ));
        assert_eq!(lobby.connection_count().await, 1);

        lobby.unbind(conn).await;
        lobby.unbind(conn).await;
        assert_eq!(lobby.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_closes_rooms() {
        let lobby = lobby();
        let created = lobby.create_room(&QuizId::new("geo"), "t").await.unwrap();
        let handle = lobby.find(created.room_code.as_str()).await.unwrap();

        lobby.close_all().await;
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }
        assert_eq!(lobby.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_goes_through_binding() {
        let lobby = lobby();
        let conn = ConnectionId::new(4);
        let err = lobby.resolve(conn).await.unwrap_err();
        assert_eq!(err.to_rejection().code(), 400);

        let created = lobby.create_room(&QuizId::new("geo"), "t").await.unwrap();
        lobby
            .bind(conn, created.room_code.clone(), Role::Host, "Host")
            .await
            .unwrap();
        let (handle, binding) = lobby.resolve(conn).await.unwrap();
        assert_eq!(handle.code(), &created.room_code);
        assert_eq!(binding.role, Role::Host);
    }

    #[tokio::test]
    async fn test_resolve_after_room_closed_reports_unavailable() {
        let lobby = lobby();
        let conn = ConnectionId::new(5);
        let created = lobby.create_room(&QuizId::new("geo"), "t").await.unwrap();
        let handle = lobby.find(created.room_code.as_str()).await.unwrap();
        lobby
            .bind(conn, created.room_code.clone(), Role::Player, "Alice")
            .await
            .unwrap();

        handle.shutdown().await.unwrap();
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }

        let err = lobby.resolve(conn).await.unwrap_err();
        assert!(matches!(err, RoomError::Unavailable(_)));
        assert_eq!(err.to_rejection().code(), 410);
        assert_eq!(lobby.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_of_closed_room_releases_its_bindings() {
        let lobby = lobby();
        let created = lobby.create_room(&QuizId::new("geo"), "t").await.unwrap();
        let handle = lobby.find(created.room_code.as_str()).await.unwrap();
        lobby
            .bind(ConnectionId::new(1), created.room_code.clone(), Role::Host, "Host")
            .await
            .unwrap();
        lobby
            .bind(ConnectionId::new(2), created.room_code.clone(), Role::Player, "Bob")
            .await
            .unwrap();

        handle.shutdown().await.unwrap();
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }

        assert!(lobby.find(created.room_code.as_str()).await.is_err());
        assert_eq!(lobby.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_release_unbinds_and_is_idempotent() {
        let lobby = lobby();
        let conn = ConnectionId::new(3);
        let created = lobby.create_room(&QuizId::new("geo"), "t").await.unwrap();
        lobby
            .bind(conn, created.room_code.clone(), Role::Player, "Alice")
            .await
            .unwrap();

        let binding = lobby.release(conn).await.unwrap();
        assert_eq!(binding.room, created.room_code);
        assert!(lobby.release(conn).await.is_none());
        assert_eq!(lobby.connection_count().await, 0);
    }
}
