//! Integration tests for the room system: registry, actor, and session
//! driven together through `RoomHandle`s.
//!
//! Every test runs with a paused clock. The runtime auto-advances time
//! whenever all tasks are idle, so countdowns and deadlines elapse
//! instantly and exact durations can be asserted.

use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{PlayerId, QuestionKind, QuizId, RoomCode, ServerEvent, SessionPhase};
use quizhall_room::{
    CorrectAnswer, HostClaim, PlayerAction, Question, Quiz, RegistryConfig, RoomConfig,
    RoomError, RoomHandle, RoomRegistry,
};
use quizhall_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

type Inbox = mpsc::UnboundedReceiver<ServerEvent>;

// =========================================================================
// Helpers
// =========================================================================

const HOST: u64 = 1;
const ALICE: u64 = 2;
const BOB: u64 = 3;

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

fn geo_quiz() -> Arc<Quiz> {
    Arc::new(Quiz {
        id: QuizId::new("geo"),
        title: "Geography".into(),
        questions: vec![
            Question {
                text: "Capital of France?".into(),
                kind: QuestionKind::SingleChoice,
                options: vec!["London".into(), "Paris".into(), "Rome".into()],
                correct_answer: Some(CorrectAnswer::Literal("Paris".into())),
                time_limit_secs: 20,
                points: 10,
            },
            Question {
                text: "The Rhine flows through Germany.".into(),
                kind: QuestionKind::TrueFalse,
                options: vec![],
                correct_answer: Some(CorrectAnswer::Literal("True".into())),
                time_limit_secs: 10,
                points: 5,
            },
        ],
    })
}

fn registry_with(room_config: RoomConfig) -> RoomRegistry {
    RoomRegistry::new(RegistryConfig::default(), room_config)
}

async fn next_event(rx: &mut Inbox) -> ServerEvent {
    time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("event should arrive")
        .expect("room should still be open")
}

/// Skips events until one named `name` arrives.
async fn wait_for(rx: &mut Inbox, name: &str) -> ServerEvent {
    loop {
        let event = next_event(rx).await;
        if event.name() == name {
            return event;
        }
    }
}

fn drain(rx: &mut Inbox) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

async fn wait_closed(handle: &RoomHandle) {
    time::timeout(Duration::from_secs(3600), async {
        while !handle.is_closed() {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room should close");
}

/// A room `ABCD` with the host attached and one inbox per named player.
async fn seated_room(
    registry: &mut RoomRegistry,
    players: &[&str],
) -> (RoomHandle, Inbox, Vec<Inbox>) {
    let code = registry
        .create_room_with_code(RoomCode::parse("ABCD").unwrap(), geo_quiz(), "host-1")
        .unwrap();
    let room = registry.find_room(code.as_str()).unwrap();

    let (tx, mut host) = mpsc::unbounded_channel();
    room.attach_host(conn(HOST), "Host", Some(QuizId::new("geo")), HostClaim::Create, tx)
        .await
        .unwrap();

    let mut inboxes = Vec::new();
    for (i, name) in players.iter().enumerate() {
        let (tx, rx) = mpsc::unbounded_channel();
        room.join(conn(ALICE + i as u64), *name, tx).await.unwrap();
        inboxes.push(rx);
    }
    drain(&mut host);
    for rx in &mut inboxes {
        drain(rx);
    }
    (room, host, inboxes)
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_room_generates_unique_codes() {
    let mut registry = registry_with(RoomConfig::default());
    let a = registry.create_room(geo_quiz(), "h1").unwrap();
    let b = registry.create_room(geo_quiz(), "h2").unwrap();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 6);
    assert_eq!(registry.room_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_find_room_is_case_insensitive_and_trims() {
    let mut registry = registry_with(RoomConfig::default());
    registry
        .create_room_with_code(RoomCode::parse("XK42P").unwrap(), geo_quiz(), "h")
        .unwrap();

    let room = registry.find_room("  xk42p\t").unwrap();
    assert_eq!(room.code().as_str(), "XK42P");
    assert!(matches!(registry.find_room("NOPE"), Err(RoomError::NotFound(_))));
    assert!(matches!(registry.find_room("bad code!"), Err(RoomError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_registry_exhaustion_fails_only_that_call() {
    let mut registry = RoomRegistry::new(
        RegistryConfig {
            code_length: 1,
            alphabet: "A".into(),
            max_attempts: 3,
        },
        RoomConfig::default(),
    );
    let first = registry.create_room(geo_quiz(), "h1").unwrap();
    assert_eq!(first.as_str(), "A");

    let err = registry.create_room(geo_quiz(), "h2").unwrap_err();
    assert!(matches!(err, RoomError::RegistryExhausted { attempts: 3 }));
    assert!(registry.find_room("a").is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_create_rejects_invalid_quiz() {
    let mut registry = registry_with(RoomConfig::default());
    let empty = Arc::new(Quiz {
        id: QuizId::new("empty"),
        title: "Nothing".into(),
        questions: vec![],
    });
    assert!(matches!(
        registry.create_room(empty, "h"),
        Err(RoomError::InvalidQuiz(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_code_in_use_and_reuse_after_close() {
    let mut registry = registry_with(RoomConfig::default());
    let code = RoomCode::parse("ABCD").unwrap();
    registry
        .create_room_with_code(code.clone(), geo_quiz(), "h")
        .unwrap();
    assert!(matches!(
        registry.create_room_with_code(code.clone(), geo_quiz(), "h"),
        Err(RoomError::CodeInUse(_))
    ));

    let handle = registry.find_room("ABCD").unwrap();
    registry.close_room(&code).await.unwrap();
    wait_closed(&handle).await;
    assert!(registry.find_room("ABCD").is_err());
    assert!(registry.create_room_with_code(code, geo_quiz(), "h").is_ok());
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_before_host_is_rejected() {
    let mut registry = registry_with(RoomConfig::default());
    let code = registry.create_room(geo_quiz(), "h").unwrap();
    let room = registry.find_room(code.as_str()).unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = room.join(conn(ALICE), "Alice", tx).await.unwrap_err();
    let rejection = err.to_rejection();
    assert_eq!(rejection.code(), 409);
    assert_eq!(
        rejection.message,
        "Room exists but host has not started the session yet"
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_returns_player_id_and_roster() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, mut host, _players) = seated_room(&mut registry, &["Alice"]).await;

    let (tx, mut bob) = mpsc::unbounded_channel();
    let id = room.join(conn(BOB), "Bob", tx).await.unwrap();
    assert_eq!(id, PlayerId(BOB));

    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::RoomJoined { is_host: false, .. }
    ));
    match wait_for(&mut host, "player_joined").await {
        ServerEvent::PlayerJoined { players } => {
            let names: Vec<_> = players.iter().map(|p| p.username.as_str()).collect();
            assert_eq!(names, vec!["Alice", "Bob"]);
        }
        _ => unreachable!(),
    }

    let info = room.info().await.unwrap();
    assert_eq!(info.player_count, 2);
    assert!(info.host_attached);
    assert_eq!(info.host_name.as_deref(), Some("Host"));
    assert_eq!(info.quiz_title, "Geography");
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_start_then_question_after_countdown() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, _host, mut players) = seated_room(&mut registry, &["Alice"]).await;
    let alice = &mut players[0];

    let started = Instant::now();
    room.act(conn(HOST), PlayerAction::Start).await.unwrap();

    assert_eq!(next_event(alice).await, ServerEvent::GameStarted {});
    assert!(matches!(
        next_event(alice).await,
        ServerEvent::PreparingNext { question_number: 1, countdown_ms: 5000 }
    ));
    match next_event(alice).await {
        ServerEvent::NewQuestion {
            question_number,
            time_limit,
            time_remaining_ms,
            options,
            ..
        } => {
            assert_eq!(question_number, 1);
            assert_eq!(time_limit, 20);
            assert_eq!(time_remaining_ms, 20_000);
            assert_eq!(options.map(|o| o.len()), Some(3));
        }
        other => panic!("expected new_question, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_correct_answer_scores_question_points() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, _host, mut players) = seated_room(&mut registry, &["Alice"]).await;
    let alice = &mut players[0];

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(alice, "new_question").await;

    room.act(conn(ALICE), PlayerAction::SubmitChoice(1))
        .await
        .unwrap();
    assert_eq!(
        next_event(alice).await,
        ServerEvent::AnswerResult {
            is_correct: true,
            correct_answer: "Paris".into(),
            points: 10,
            new_score: 10,
        }
    );
    match wait_for(alice, "update_scores").await {
        ServerEvent::UpdateScores { players } => assert_eq!(players[0].score, 10),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_scenario_deadline_locks_for_silent_player() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, _host, mut players) = seated_room(&mut registry, &["Alice", "Bob"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut players[0], "new_question").await;
    wait_for(&mut players[1], "new_question").await;
    let opened = Instant::now();

    room.act(conn(ALICE), PlayerAction::SubmitChoice(0))
        .await
        .unwrap();

    assert_eq!(wait_for(&mut players[0], "time_up").await, ServerEvent::TimeUp {});
    assert_eq!(wait_for(&mut players[1], "time_up").await, ServerEvent::TimeUp {});
    assert_eq!(opened.elapsed(), Duration::from_secs(20));

    match wait_for(&mut players[1], "update_scores").await {
        ServerEvent::UpdateScores { players } => {
            assert!(players.iter().all(|p| p.score == 0));
        }
        _ => unreachable!(),
    }
    assert_eq!(room.info().await.unwrap().phase, SessionPhase::QuestionLocked);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_next_on_last_question_ends_game() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, mut host, mut players) =
        seated_room(&mut registry, &["Alice", "Bob"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut host, "new_question").await;
    // Q1: only Bob is right.
    room.act(conn(ALICE), PlayerAction::SubmitChoice(0)).await.unwrap();
    room.act(conn(BOB), PlayerAction::SubmitChoice(1)).await.unwrap();
    wait_for(&mut host, "time_up").await;

    room.act(conn(HOST), PlayerAction::Next).await.unwrap();
    wait_for(&mut host, "new_question").await;
    // Q2: both right, Bob stays ahead.
    room.act(conn(ALICE), PlayerAction::SubmitChoice(0)).await.unwrap();
    room.act(conn(BOB), PlayerAction::SubmitChoice(0)).await.unwrap();
    wait_for(&mut host, "time_up").await;

    room.act(conn(HOST), PlayerAction::Next).await.unwrap();
    for inbox in players.iter_mut().chain(std::iter::once(&mut host)) {
        match wait_for(inbox, "game_over").await {
            ServerEvent::GameOver { players, quiz_id } => {
                let rows: Vec<_> = players
                    .iter()
                    .map(|p| (p.username.as_str(), p.score))
                    .collect();
                assert_eq!(rows, vec![("Bob", 15), ("Alice", 5)]);
                assert_eq!(quiz_id.as_str(), "geo");
            }
            _ => unreachable!(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_game_over_ties_keep_join_order() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, mut host, _players) = seated_room(&mut registry, &["Zed", "Amy"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    room.act(conn(HOST), PlayerAction::End).await.unwrap();
    match wait_for(&mut host, "game_over").await {
        ServerEvent::GameOver { players, .. } => {
            let names: Vec<_> = players.iter().map(|p| p.username.as_str()).collect();
            assert_eq!(names, vec!["Zed", "Amy"]);
        }
        _ => unreachable!(),
    }
}

// =========================================================================
// Properties
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_one_lock_per_question_when_answer_races_deadline() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, mut host, _players) = seated_room(&mut registry, &["Alice"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut host, "new_question").await;

    // Land the answer right at the deadline.
    time::sleep(Duration::from_secs(20)).await;
    let _ = room.act(conn(ALICE), PlayerAction::SubmitChoice(1)).await;
    time::sleep(Duration::from_secs(60)).await;

    let events = drain(&mut host);
    let time_ups = events.iter().filter(|e| e.name() == "time_up").count();
    let questions = events.iter().filter(|e| e.name() == "new_question").count();
    assert_eq!(time_ups, 1);
    assert_eq!(questions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_answers_count_once() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, mut host, mut players) =
        seated_room(&mut registry, &["Alice", "Bob"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut host, "new_question").await;
    for _ in 0..3 {
        room.act(conn(ALICE), PlayerAction::SubmitChoice(1)).await.unwrap();
    }

    let results = drain(&mut players[0])
        .into_iter()
        .filter(|e| e.name() == "answer_result")
        .count();
    assert_eq!(results, 1);
    match drain(&mut host).last() {
        Some(ServerEvent::AnswerCount { answered, total }) => {
            assert_eq!((*answered, *total), (1, 2));
        }
        other => panic!("expected answer_count, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_leaves_state_untouched() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, _host, _players) = seated_room(&mut registry, &["Alice"]).await;

    let err = room
        .act(conn(ALICE), PlayerAction::SubmitChoice(0))
        .await
        .unwrap_err();
    assert_eq!(err.to_rejection().code(), 400);
    let err = room.act(conn(ALICE), PlayerAction::Start).await.unwrap_err();
    assert_eq!(err.to_rejection().code(), 403);
    assert_eq!(room.info().await.unwrap().phase, SessionPhase::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_host_leaving_closes_room_and_frees_code() {
    let mut registry = registry_with(RoomConfig::default());
    let (room, _host, mut players) = seated_room(&mut registry, &["Alice"]).await;

    room.detach(conn(HOST)).await.unwrap();
    assert!(matches!(
        next_event(&mut players[0]).await,
        ServerEvent::Error { code: 410, .. }
    ));
    wait_closed(&room).await;
    assert!(registry.find_room("ABCD").is_err());
    assert!(matches!(
        room.info().await,
        Err(RoomError::Unavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_finished_room_closes_after_grace() {
    let mut registry = registry_with(RoomConfig {
        finished_grace: Duration::from_secs(30),
        ..RoomConfig::default()
    });
    let (room, mut host, _players) = seated_room(&mut registry, &["Alice"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    room.act(conn(HOST), PlayerAction::End).await.unwrap();
    wait_for(&mut host, "game_over").await;
    let finished = Instant::now();

    wait_closed(&room).await;
    assert!(finished.elapsed() >= Duration::from_secs(30));
    assert!(finished.elapsed() < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_idle_room_is_abandoned() {
    let mut registry = registry_with(RoomConfig {
        idle_timeout: Duration::from_secs(60),
        ..RoomConfig::default()
    });
    let (room, mut host, _players) = seated_room(&mut registry, &[]).await;

    assert!(matches!(
        next_event(&mut host).await,
        ServerEvent::Error { code: 410, .. }
    ));
    wait_closed(&room).await;
    assert_eq!(registry.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_advance_moves_to_next_question() {
    let mut registry = registry_with(RoomConfig {
        auto_advance: Some(Duration::from_secs(3)),
        ..RoomConfig::default()
    });
    let (room, mut host, _players) = seated_room(&mut registry, &["Alice"]).await;

    room.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut host, "new_question").await;
    room.act(conn(ALICE), PlayerAction::SubmitChoice(1)).await.unwrap();
    wait_for(&mut host, "time_up").await;
    let locked = Instant::now();

    match wait_for(&mut host, "preparing_next").await {
        ServerEvent::PreparingNext { question_number, .. } => assert_eq!(question_number, 2),
        _ => unreachable!(),
    }
    assert_eq!(locked.elapsed(), Duration::from_secs(3));
    match wait_for(&mut host, "new_question").await {
        ServerEvent::NewQuestion { options, kind, .. } => {
            assert_eq!(kind, QuestionKind::TrueFalse);
            assert_eq!(options, Some(vec!["True".to_string(), "False".to_string()]));
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rooms_run_independently() {
    let mut registry = registry_with(RoomConfig::default());
    let (room_a, mut host_a, _pa) = seated_room(&mut registry, &["Alice"]).await;

    let code_b = registry.create_room(geo_quiz(), "other").unwrap();
    let room_b = registry.find_room(code_b.as_str()).unwrap();
    let (tx, mut host_b) = mpsc::unbounded_channel();
    room_b
        .attach_host(conn(10), "Other", None, HostClaim::Join, tx)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut host_b).await,
        ServerEvent::RoomJoined { is_host: true, .. }
    ));

    room_a.act(conn(HOST), PlayerAction::Start).await.unwrap();
    wait_for(&mut host_a, "new_question").await;
    assert_eq!(room_b.info().await.unwrap().phase, SessionPhase::Waiting);
}
