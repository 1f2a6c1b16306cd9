//! The bridge: a two-way index between connections and rooms.
//!
//! Not thread-safe on its own. The server keeps one behind a mutex and
//! never holds that lock across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use quizhall_protocol::{PlayerId, RoomCode};
use quizhall_transport::ConnectionId;
use tracing::{debug, info};

use crate::{Binding, BridgeError, Role};

/// Derives the in-room identity of a connection.
///
/// A reconnecting client gets a fresh connection and therefore a fresh
/// `PlayerId`.
pub fn player_id_for(conn: ConnectionId) -> PlayerId {
    PlayerId(conn.into_inner())
}

/// Tracks which connection sits in which room.
#[derive(Debug, Default)]
pub struct ConnectionBridge {
    bindings: HashMap<ConnectionId, Binding>,
    /// Reverse index, kept in sync with `bindings`. Ordered by connection
    /// id so iteration follows join order.
    by_room: HashMap<RoomCode, BTreeSet<ConnectionId>>,
}

impl ConnectionBridge {
    /// Creates an empty bridge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `conn` joined `room` in `role`.
    ///
    /// # Errors
    /// Returns [`BridgeError::AlreadyBound`] if the connection is already
    /// in a room.
    pub fn bind(
        &mut self,
        conn: ConnectionId,
        room: RoomCode,
        role: Role,
        username: impl Into<String>,
    ) -> Result<&Binding, BridgeError> {
        if let Some(existing) = self.bindings.get(&conn) {
            return Err(BridgeError::AlreadyBound(conn, existing.room.clone()));
        }

        let binding = Binding {
            room: room.clone(),
            role,
            username: username.into(),
            player_id: player_id_for(conn),
            bound_at: Instant::now(),
        };
        info!(%conn, %room, %role, username = %binding.username, "connection bound");

        self.by_room.entry(room).or_default().insert(conn);
        Ok(self.bindings.entry(conn).or_insert(binding))
    }

    /// Removes the binding of `conn` and returns it.
    ///
    /// # Errors
    /// Returns [`BridgeError::NotBound`] if the connection is not in a room.
    pub fn unbind(&mut self, conn: ConnectionId) -> Result<Binding, BridgeError> {
        let binding = self
            .bindings
            .remove(&conn)
            .ok_or(BridgeError::NotBound(conn))?;

        if let Some(members) = self.by_room.get_mut(&binding.room) {
            members.remove(&conn);
            if members.is_empty() {
                self.by_room.remove(&binding.room);
            }
        }
        debug!(%conn, room = %binding.room, "connection unbound");
        Ok(binding)
    }

    /// Returns the binding of `conn`, if any.
    pub fn lookup(&self, conn: ConnectionId) -> Option<&Binding> {
        self.bindings.get(&conn)
    }

    /// Like [`lookup`](Self::lookup) but fails when unbound.
    ///
    /// # Errors
    /// Returns [`BridgeError::NotBound`] if the connection is not in a room.
    pub fn require(&self, conn: ConnectionId) -> Result<&Binding, BridgeError> {
        self.lookup(conn).ok_or(BridgeError::NotBound(conn))
    }

    /// Connections currently bound to `room`, in join order.
    pub fn connections_in(&self, room: &RoomCode) -> Vec<ConnectionId> {
        self.by_room
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drops every binding of `room`, e.g. after the room closed.
    /// Returns the connections that were released.
    pub fn release_room(&mut self, room: &RoomCode) -> Vec<ConnectionId> {
        let released: Vec<_> = self
            .by_room
            .remove(room)
            .map(|members| members.into_iter().collect())
            .unwrap_or_default();
        for conn in &released {
            self.bindings.remove(conn);
        }
        if !released.is_empty() {
            info!(%room, count = released.len(), "room bindings released");
        }
        released
    }

    /// Number of bound connections.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if no connection is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
