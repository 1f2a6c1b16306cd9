//! `QuizServer` builder and server loop.
//!
//! This is the entry point for running a Quizhall server. It ties
//! together all the layers: transport → protocol → bridge → room, plus the
//! optional lobby HTTP API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{Codec, JsonCodec};
use quizhall_room::{QuizStore, RegistryConfig, RoomConfig};
use quizhall_transport::{Handshake, Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::QuizhallError;
use crate::handler::handle_connection;
use crate::http;
use crate::lobby::Lobby;

/// Server configuration. Plain data; see [`QuizServerBuilder`] for setters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address.
    pub bind_addr: String,
    /// Lobby HTTP listen address. `None` disables the HTTP API.
    pub http_addr: Option<String>,
    /// A peer that has not finished the WebSocket upgrade after this long
    /// is dropped.
    pub handshake_timeout: Duration,
    /// A connection whose peer sends nothing, not even a pong, for this
    /// long is closed. The server pings well within this window.
    pub connection_idle_timeout: Duration,
    pub room: RoomConfig,
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            http_addr: None,
            handshake_timeout: WebSocketTransport::DEFAULT_HANDSHAKE_TIMEOUT,
            connection_idle_timeout: Duration::from_secs(5 * 60),
            room: RoomConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<Q, C> {
    pub(crate) lobby: Arc<Lobby<Q>>,
    pub(crate) codec: C,
    pub(crate) connection_idle_timeout: Duration,
}

/// Builder for configuring and starting a Quizhall server.
///
/// # Example
///
/// ```rust,ignore
/// use quizhall::prelude::*;
///
/// let server = QuizServer::builder()
///     .bind("0.0.0.0:8080")
///     .http("0.0.0.0:8081")
///     .build(InMemoryQuizStore::from_json(&catalogue)?)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct QuizServerBuilder {
    config: ServerConfig,
}

impl QuizServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the WebSocket listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Enables the lobby HTTP API on `addr`.
    pub fn http(mut self, addr: &str) -> Self {
        self.config.http_addr = Some(addr.to_string());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn connection_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_idle_timeout = timeout;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    /// Binds the listeners. Quizzes are fetched from `quizzes` when rooms
    /// are created.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<Q: QuizStore>(
        self,
        quizzes: Q,
    ) -> Result<QuizServer<Q, JsonCodec>, QuizhallError> {
        let ServerConfig {
            bind_addr,
            http_addr,
            handshake_timeout,
            connection_idle_timeout,
            room,
            registry,
        } = self.config;

        let transport = WebSocketTransport::bind(&bind_addr)
            .await?
            .with_handshake_timeout(handshake_timeout);
        let http = match http_addr {
            Some(addr) => {
                let listener = TcpListener::bind(&addr).await?;
                info!(addr, "lobby HTTP API listening");
                Some(listener)
            }
            None => None,
        };

        let state = Arc::new(ServerState {
            lobby: Arc::new(Lobby::new(quizzes, registry, room)),
            codec: JsonCodec,
            connection_idle_timeout,
        });

        Ok(QuizServer {
            transport,
            http,
            state,
        })
    }
}

/// A bound Quizhall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct QuizServer<Q, C> {
    transport: WebSocketTransport,
    http: Option<TcpListener>,
    state: Arc<ServerState<Q, C>>,
}

impl QuizServer<(), JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> QuizServerBuilder {
        QuizServerBuilder::new()
    }
}

impl<Q, C> QuizServer<Q, C>
where
    Q: QuizStore,
    C: Codec + 'static,
{
    /// Returns the WebSocket address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, QuizhallError> {
        Ok(self.transport.local_addr()?)
    }

    /// Returns the lobby HTTP address, if the API is enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// The lobby, for allocating rooms in-process.
    pub fn lobby(&self) -> Arc<Lobby<Q>> {
        Arc::clone(&self.state.lobby)
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), QuizhallError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` resolves, then closes every room.
    ///
    /// Accepts incoming streams and spawns a task for each that runs the
    /// WebSocket upgrade and then the connection handler.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), QuizhallError> {
        let http_task = self.http.take().map(|listener| self.serve_http(listener));
        info!("quizhall server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let peer = pending.peer_addr();
                            let conn = match pending.complete().await {
                                Ok(conn) => conn,
                                Err(e) => {
                                    debug!(%peer, error = %e, "handshake failed");
                                    return;
                                }
                            };
                            if let Err(e) = handle_connection(conn, state).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        info!("quizhall server shutting down");
        self.state.lobby.close_all().await;
        if let Some(task) = http_task {
            task.abort();
        }
        Ok(())
    }

    fn serve_http(&self, listener: TcpListener) -> JoinHandle<()> {
        let app = http::router(Arc::clone(&self.state.lobby));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "lobby HTTP API stopped");
            }
        })
    }
}
