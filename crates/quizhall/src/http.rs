//! Lobby HTTP API.
//!
//! Request/response calls that sit beside the real-time channel:
//!
//! | Method | Path                | Success                        |
//! |--------|---------------------|--------------------------------|
//! | POST   | `/api/rooms`        | `201 {room_code, quiz_title}`  |
//! | GET    | `/api/rooms/{code}` | `200` room summary             |
//! | GET    | `/health`           | `200 {status, rooms, connections}` |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use quizhall_protocol::QuizId;
use quizhall_room::{QuizStore, RoomError, StoreError};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::lobby::{CreatedRoom, Lobby, RoomSummary};

/// Builds the lobby router.
pub fn router<Q: QuizStore>(lobby: Arc<Lobby<Q>>) -> Router {
    Router::new()
        .route("/api/rooms", post(create_room::<Q>))
        .route("/api/rooms/{code}", get(get_room::<Q>))
        .route("/health", get(health::<Q>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(lobby)
}

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    quiz_id: QuizId,
    host_id: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    rooms: usize,
    connections: usize,
}

/// An error response: `{"error": message, "status": code}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        let status = match &err {
            RoomError::NotFound(_) | RoomError::Unavailable(_) => StatusCode::NOT_FOUND,
            RoomError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            RoomError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            RoomError::Store(StoreError::Malformed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RoomError::InvalidQuiz(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RoomError::RegistryExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RoomError::CodeInUse(_) => StatusCode::CONFLICT,
            RoomError::Rejected(rejection) => {
                StatusCode::from_u16(rejection.code()).unwrap_or(StatusCode::BAD_REQUEST)
            }
        };
        if status.is_server_error() {
            warn!(error = %err, "lobby request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

async fn create_room<Q: QuizStore>(
    State(lobby): State<Arc<Lobby<Q>>>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedRoom>), ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    if request.host_id.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "host_id cannot be empty"));
    }

    let created = lobby
        .create_room(&request.quiz_id, request.host_id.trim())
        .await?;
    info!(room = %created.room_code, quiz = %request.quiz_id, "room allocated over HTTP");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_room<Q: QuizStore>(
    State(lobby): State<Arc<Lobby<Q>>>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, ApiError> {
    Ok(Json(lobby.lookup_room(&code).await?))
}

async fn health<Q: QuizStore>(State(lobby): State<Arc<Lobby<Q>>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        rooms: lobby.room_count().await,
        connections: lobby.connection_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use quizhall_protocol::QuestionKind;
    use quizhall_room::{
        CorrectAnswer, InMemoryQuizStore, Question, Quiz, RegistryConfig, RoomConfig,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = InMemoryQuizStore::from_quizzes([
            Quiz {
                id: QuizId::new("geo"),
                title: "Geography".into(),
                questions: vec![Question {
                    text: "Capital of France?".into(),
                    kind: QuestionKind::SingleChoice,
                    options: vec!["London".into(), "Paris".into()],
                    correct_answer: Some(CorrectAnswer::Literal("Paris".into())),
                    time_limit_secs: 20,
                    points: 10,
                }],
            },
            Quiz {
                id: QuizId::new("broken"),
                title: "Broken".into(),
                questions: vec![],
            },
        ]);
        router(Arc::new(Lobby::new(
            store,
            RegistryConfig::default(),
            RoomConfig::default(),
        )))
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_room_returns_code_and_title() {
        let app = app();
        let (status, body) = call(
            &app,
            post_json("/api/rooms", r#"{"quiz_id":"geo","host_id":"host-1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["quiz_title"], "Geography");
        assert_eq!(body["room_code"].as_str().map(str::len), Some(6));
    }

    #[tokio::test]
    async fn test_lookup_after_create_is_case_insensitive() {
        let app = app();
        let (_, created) = call(
            &app,
            post_json("/api/rooms", r#"{"quiz_id":"geo","host_id":"t"}"#),
        )
        .await;
        let code = created["room_code"].as_str().unwrap().to_lowercase();

        let (status, body) = call(&app, get(&format!("/api/rooms/{code}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quiz_title"], "Geography");
        assert_eq!(body["quiz_id"], "geo");
        assert_eq!(body["phase"], "waiting");
        assert_eq!(body["player_count"], 0);
        assert_eq!(body["host_connected"], false);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();
        let (status, body) = call(
            &app,
            post_json("/api/rooms", r#"{"quiz_id":"missing","host_id":"t"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert!(body["error"].is_string());

        let (status, _) = call(
            &app,
            post_json("/api/rooms", r#"{"quiz_id":"broken","host_id":"t"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = call(&app, post_json("/api/rooms", r#"{"quiz_id":"geo"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);

        let (status, _) = call(&app, get("/api/rooms/NOPE42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_counts_rooms() {
        let app = app();
        let (status, body) = call(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rooms"], 0);

        call(
            &app,
            post_json("/api/rooms", r#"{"quiz_id":"geo","host_id":"t"}"#),
        )
        .await;
        let (_, body) = call(&app, get("/health")).await;
        assert_eq!(body["rooms"], 1);
    }
}
