//! Fan-out of server events to the connections of one room.
//!
//! The room actor is the only producer, and every recipient has its own
//! unbounded queue, so all recipients see one room's events in the order
//! the state machine produced them.

use quizhall_protocol::ServerEvent;
use quizhall_transport::ConnectionId;
use tokio::sync::mpsc;
use tracing::trace;

/// Channel into a connection handler's outbound queue.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every registered connection.
    All,
    /// One connection.
    Only(ConnectionId),
}

/// The registered connections of a room, in registration order.
#[derive(Debug, Default)]
pub struct Dispatcher {
    members: Vec<(ConnectionId, EventSender)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn`. A second registration replaces the sender.
    pub fn register(&mut self, conn: ConnectionId, sender: EventSender) {
        match self.members.iter_mut().find(|(id, _)| *id == conn) {
            Some(slot) => slot.1 = sender,
            None => self.members.push((conn, sender)),
        }
    }

    /// Removes `conn`. Returns `false` if it was not registered.
    pub fn unregister(&mut self, conn: ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|(id, _)| *id != conn);
        self.members.len() != before
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Delivers `event` to every registered connection.
    pub fn broadcast(&self, event: ServerEvent) {
        self.dispatch(Recipient::All, event);
    }

    /// Delivers `event` to one connection.
    pub fn notify(&self, conn: ConnectionId, event: ServerEvent) {
        self.dispatch(Recipient::Only(conn), event);
    }

    /// Delivers `event` to `recipient`.
    ///
    /// Best effort: a connection whose handler is gone misses the event.
    pub fn dispatch(&self, recipient: Recipient, event: ServerEvent) {
        let name = event.name();
        for (conn, sender) in &self.members {
            let wanted = match recipient {
                Recipient::All => true,
                Recipient::Only(target) => *conn == target,
            };
            if !wanted {
                continue;
            }
            if sender.send(event.clone()).is_err() {
                trace!(%conn, event = name, "recipient gone, event dropped");
            } else {
                trace!(%conn, event = name, "event dispatched");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
