//! Core session server implementation.
//!
//! This module contains the `SessionServer` struct, which owns the listening
//! socket, the accept loop and the periodic broadcast, and wires accepted
//! connections into the shared [`SessionHub`].

use super::hub::SessionHub;
use super::upgrade::handle_connection;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handlers::SessionHandlers;
use crate::identity::IdentityStore;
use crate::scheduler::Scheduler;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Listen backlog for the server socket.
const LISTEN_BACKLOG: i32 = 1024;

/// The session server.
///
/// `SessionServer` accepts WebSocket connections, hands them to the hub for
/// admission and keeps the player-count broadcast running. All per-client
/// work happens on the tasks the hub spawns for each admitted client.
pub struct SessionServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Shared state reachable from every connection task
    hub: Arc<SessionHub>,

    /// Runs the periodic broadcast
    scheduler: Scheduler,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl SessionServer {
    /// Creates a server with the given collaborators. Nothing is bound yet.
    pub fn new(
        config: ServerConfig,
        identity: Arc<dyn IdentityStore>,
        handlers: Arc<dyn SessionHandlers>,
    ) -> Self {
        let hub = Arc::new(SessionHub::new(config.clone(), identity, handlers));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            hub,
            scheduler: Scheduler::new(),
            shutdown_sender,
        }
    }

    /// Binds the configured address.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.config.bind_address;

        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        socket
            .bind(&address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::Network(format!("Failed to set non-blocking: {e}")))?;

        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))?;

        info!("✅ Listener bound on {}", address);
        Ok(listener)
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Starting session server on {}", local_addr);

        self.start_broadcast();

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }

                        let hub = self.hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, hub).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("🧹 Performing server cleanup...");
        self.scheduler.shutdown();
        let closed = self
            .hub
            .registry()
            .snapshot()
            .iter()
            .filter(|client| client.close())
            .count();
        info!("✅ Closed {} client session(s)", closed);

        info!("Server stopped");
        Ok(())
    }

    fn start_broadcast(&self) {
        let period = self.config.broadcast_interval();
        if period.is_zero() {
            info!("⏸️ Player count broadcast disabled (interval: 0ms)");
            return;
        }

        let hub = self.hub.clone();
        self.scheduler.every(period, move || {
            let hub = hub.clone();
            async move { hub.broadcast_tick().await }
        });
        info!(
            "🕒 Player count broadcast every {}ms",
            self.config.broadcast_interval_ms
        );
    }

    /// Initiates graceful server shutdown.
    ///
    /// Stops the accept loop and the broadcast, then closes every client.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Initiating server shutdown");
        // No receiver just means the server is not serving.
        let _ = self.shutdown_sender.send(());
        self.scheduler.shutdown();
        Ok(())
    }

    /// Gets a reference to the shared session hub.
    pub fn get_hub(&self) -> Arc<SessionHub> {
        self.hub.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for SessionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServer")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}
