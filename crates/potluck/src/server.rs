//! `PotluckServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → registry → rooms.

use std::sync::Arc;

use potluck_room::{Registry, RoomConfig};
use potluck_transport::{Transport, WebSocketTransport};

use crate::ServerError;
use crate::handler::{WsLink, handle_connection};

/// Shared server state handed to every connection handler task.
pub(crate) struct ServerState {
    /// The room registry; internally synchronized, shared by clone.
    pub(crate) registry: Registry<WsLink>,
    /// The configuration stamped onto every room this server creates.
    pub(crate) room_config: RoomConfig,
}

/// Builder for configuring and starting a Potluck server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), potluck::ServerError> {
/// let server = potluck::PotluckServer::builder()
///     .bind("0.0.0.0:8000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct PotluckServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
}

impl PotluckServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            room_config: RoomConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration applied to every room.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Binds the WebSocket transport and assembles the server.
    pub async fn build(self) -> Result<PotluckServer, ServerError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState {
            registry: Registry::new(),
            room_config: self.room_config.validated(),
        });
        Ok(PotluckServer { transport, state })
    }
}

impl Default for PotluckServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Potluck server. Call [`run()`](Self::run) to start
/// accepting connections.
pub struct PotluckServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl PotluckServer {
    /// Creates a new builder.
    pub fn builder() -> PotluckServerBuilder {
        PotluckServerBuilder::new()
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop: one handler task per connection, until
    /// the process is terminated. A failed accept is logged and never
    /// takes the server down.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("potluck server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
