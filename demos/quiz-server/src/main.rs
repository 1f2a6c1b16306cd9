//! Quizhall demo server.
//!
//! Loads a quiz catalogue from a JSON file and serves it over WebSocket,
//! with the lobby HTTP API on a second port.
//!
//! Run with:
//! ```not_rust
//! cargo run -p quiz-server -- --quizzes demos/quiz-server/quizzes.json
//! RUST_LOG=quizhall_room=debug cargo run -p quiz-server -- --auto-advance-secs 5
//! ```
//!
//! Then allocate a room and connect:
//! ```not_rust
//! curl -X POST localhost:8081/api/rooms -H 'content-type: application/json' \
//!      -d '{"quiz_id":"capitals","host_id":"host-1"}'
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use quizhall::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quiz-server")]
#[command(about = "Real-time quiz session server", long_about = None)]
struct Args {
    /// WebSocket listen address
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Lobby HTTP API listen address
    #[arg(long, default_value = "127.0.0.1:8081")]
    http: String,

    /// Quiz catalogue: a JSON array of quizzes
    #[arg(long, default_value = "demos/quiz-server/quizzes.json")]
    quizzes: PathBuf,

    /// Default log level; RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Countdown before each question, in seconds
    #[arg(long, default_value_t = 5)]
    countdown_secs: u64,

    /// Advance past a locked question after this many seconds instead of
    /// waiting for the host
    #[arg(long)]
    auto_advance_secs: Option<u64>,
}

fn setup_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "quizhall={default_level},quizhall_room={default_level},quiz_server={default_level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), QuizhallError> {
    let args = Args::parse();
    setup_logger(&args.log_level);

    let catalogue = tokio::fs::read_to_string(&args.quizzes).await?;
    let quizzes = InMemoryQuizStore::from_json(&catalogue)?;
    tracing::info!(path = %args.quizzes.display(), quizzes = quizzes.len().await, "quiz catalogue loaded");

    let rooms = RoomConfig {
        preparing_countdown: Duration::from_secs(args.countdown_secs),
        auto_advance: args.auto_advance_secs.map(Duration::from_secs),
        ..RoomConfig::default()
    };

    let server = QuizServer::builder()
        .bind(&args.bind)
        .http(&args.http)
        .room_config(rooms)
        .build(quizzes)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
