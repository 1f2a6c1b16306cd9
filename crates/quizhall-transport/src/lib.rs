//! Transport abstraction layer for Quizhall.
//!
//! Provides the [`Transport`] and [`Connection`] traits so the session
//! engine never touches sockets directly. Each accepted connection gets an
//! ephemeral [`ConnectionId`]; a reconnecting client always gets a new one.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

use tokio::time::Instant;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// Accepting is split in two: [`accept`](Transport::accept) only takes the
/// raw stream off the listener, and [`Handshake::complete`] upgrades it.
/// Run the handshake in the connection's own task so a peer that never
/// finishes it stalls nobody else.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted stream whose handshake has not run yet.
    type Pending: Handshake<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming stream.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// The upgrade step of an accepted stream.
pub trait Handshake: Send + 'static {
    /// The connection produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for a failed or timed out handshake.
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake.
    async fn complete(self) -> Result<Self::Connection, Self::Error>;
}

/// A single bidirectional, message-oriented connection.
///
/// `send` and `recv` may be called concurrently from the same task
/// (e.g. from two branches of a `tokio::select!`).
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a keep-alive ping. The peer's pong shows up in
    /// [`last_seen`](Connection::last_seen), not in `recv`.
    async fn ping(&self) -> Result<(), Self::Error>;

    /// When the peer last sent anything, control frames included.
    fn last_seen(&self) -> Instant;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
