//! Room registry: maps room codes to running room actors.
//!
//! Codes are unique among open rooms only. When a room's actor stops, its
//! handle reports closed and the code is pruned on the next lookup or
//! creation, so it can be handed out again.

use std::collections::HashMap;
use std::sync::Arc;

use quizhall_protocol::RoomCode;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::room::spawn_room;
use crate::{Quiz, RegistryConfig, RoomConfig, RoomError, RoomHandle};

/// Owns the code → room mapping.
///
/// Not thread-safe on its own; the server keeps it behind a mutex.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,
    alphabet: Vec<char>,
    config: RegistryConfig,
    room_config: RoomConfig,
}

impl RoomRegistry {
    /// Creates an empty registry. Rooms it spawns use `room_config`.
    pub fn new(config: RegistryConfig, room_config: RoomConfig) -> Self {
        let mut alphabet: Vec<char> = config
            .alphabet
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        if alphabet.is_empty() {
            warn!("registry alphabet has no usable characters, using the default");
            alphabet = RegistryConfig::default().alphabet.chars().collect();
        }
        Self {
            rooms: HashMap::new(),
            alphabet,
            config,
            room_config,
        }
    }

    /// The configuration rooms are spawned with.
    pub fn room_config(&self) -> &RoomConfig {
        &self.room_config
    }

    /// Spawns a room for `quiz` under a fresh random code.
    ///
    /// # Errors
    /// - [`RoomError::InvalidQuiz`] if the quiz cannot be played.
    /// - [`RoomError::RegistryExhausted`] if every attempt collided.
    pub fn create_room(&mut self, quiz: Arc<Quiz>, host_id: &str) -> Result<RoomCode, RoomError> {
        quiz.validate()?;
        self.prune_closed();

        for attempt in 1..=self.config.max_attempts {
            let Ok(code) = RoomCode::parse(&self.generate_code()) else {
                continue;
            };
            if self.rooms.contains_key(&code) {
                debug!(%code, attempt, "room code collision");
                continue;
            }
            return Ok(self.insert(code, quiz, host_id));
        }

        warn!(attempts = self.config.max_attempts, rooms = self.rooms.len(), "room registry exhausted");
        Err(RoomError::RegistryExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Spawns a room under a caller-chosen code.
    ///
    /// # Errors
    /// - [`RoomError::InvalidQuiz`] if the quiz cannot be played.
    /// - [`RoomError::CodeInUse`] if an open room already has this code.
    pub fn create_room_with_code(
        &mut self,
        code: RoomCode,
        quiz: Arc<Quiz>,
        host_id: &str,
    ) -> Result<RoomCode, RoomError> {
        quiz.validate()?;
        self.prune_closed();
        if self.rooms.contains_key(&code) {
            return Err(RoomError::CodeInUse(code));
        }
        Ok(self.insert(code, quiz, host_id))
    }

    /// Looks up an open room. Case-insensitive; surrounding whitespace is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] for unknown, closed, or malformed codes.
    pub fn find_room(&mut self, raw: &str) -> Result<RoomHandle, RoomError> {
        let code = RoomCode::parse(raw).map_err(|_| RoomError::NotFound(raw.to_string()))?;
        match self.rooms.get(&code) {
            Some(handle) if !handle.is_closed() => Ok(handle.clone()),
            Some(_) => {
                self.rooms.remove(&code);
                debug!(%code, "closed room pruned on lookup");
                Err(RoomError::NotFound(raw.to_string()))
            }
            None => Err(RoomError::NotFound(raw.to_string())),
        }
    }

    /// Closes a room and frees its code.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] if no room has this code.
    pub async fn close_room(&mut self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(code)
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;
        // An actor that already stopped has nothing left to shut down.
        let _ = handle.shutdown().await;
        info!(room = %code, "room closed by registry");
        Ok(())
    }

    /// Forgets rooms whose actor has stopped. Returns their codes.
    pub fn prune_closed(&mut self) -> Vec<RoomCode> {
        let closed: Vec<RoomCode> = self
            .rooms
            .iter()
            .filter(|(_, handle)| handle.is_closed())
            .map(|(code, _)| code.clone())
            .collect();
        for code in &closed {
            self.rooms.remove(code);
            debug!(%code, "closed room pruned");
        }
        closed
    }

    /// Number of rooms whose actor is still running.
    pub fn room_count(&self) -> usize {
        self.rooms.values().filter(|h| !h.is_closed()).count()
    }

    /// Handles to every open room.
    pub fn list(&self) -> Vec<RoomHandle> {
        self.rooms
            .values()
            .filter(|h| !h.is_closed())
            .cloned()
            .collect()
    }

    fn insert(&mut self, code: RoomCode, quiz: Arc<Quiz>, host_id: &str) -> RoomCode {
        info!(room = %code, quiz = %quiz.id, %host_id, "room created");
        let handle = spawn_room(code.clone(), quiz, self.room_config.clone(), host_id);
        self.rooms.insert(code.clone(), handle);
        code
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        let length = self.config.code_length.clamp(1, RoomCode::MAX_LEN);
        (0..length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect()
    }
}
