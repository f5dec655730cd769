//! Shared session state.
//!
//! The [`SessionHub`] owns the client registry and the collaborators every
//! connection task needs. Admission lives in [`super::admission`], frame
//! dispatch in [`crate::messaging::router`].

use crate::access_log::write_log;
use crate::config::ServerConfig;
use crate::connection::{ClientId, ClientRegistry, SessionClient};
use crate::handlers::SessionHandlers;
use crate::identity::IdentityStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Connection hub shared by the accept loop, every connection task and the
/// broadcast scheduler.
pub struct SessionHub {
    config: ServerConfig,
    registry: ClientRegistry,
    identity: Arc<dyn IdentityStore>,
    handlers: Arc<dyn SessionHandlers>,

    /// Next session-local id. Holding this lock serializes admissions.
    pub(super) last_id: Mutex<ClientId>,
}

impl SessionHub {
    pub fn new(
        config: ServerConfig,
        identity: Arc<dyn IdentityStore>,
        handlers: Arc<dyn SessionHandlers>,
    ) -> Self {
        Self {
            config,
            registry: ClientRegistry::new(),
            identity,
            handlers,
            last_id: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    pub fn handlers(&self) -> &Arc<dyn SessionHandlers> {
        &self.handlers
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn get_client(&self, uuid: &str) -> Option<Arc<SessionClient>> {
        self.registry.get(uuid)
    }

    /// Queues a frame for every registered client.
    ///
    /// Works on a snapshot of the registry and never waits on a client, so a
    /// stalled client cannot hold up delivery to the others; its own queue
    /// policy closes it instead. Returns how many clients accepted the frame.
    pub fn broadcast<S: AsRef<str>>(&self, fields: &[S]) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|client| client.send_msg(fields))
            .count()
    }

    /// One run of the periodic broadcast: player count, then party state.
    pub async fn broadcast_tick(&self) {
        let count = self.client_count().to_string();
        let delivered = self.broadcast(&["pc", &count]);
        debug!("📣 Player count {} delivered to {} client(s)", count, delivered);

        self.handlers.send_party_update(self).await;
    }

    /// Detaches a client: raises its close signal and unregisters it.
    ///
    /// Called by whichever of the reader and writer stops first (and again by
    /// the other one); only the call that actually unregisters logs.
    pub fn teardown(&self, client: &Arc<SessionClient>) {
        client.close();
        if self.registry.remove(client) {
            write_log(client.ip, "session", "disconnect", 200);
        }
    }
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("config", &self.config)
            .field("clients", &self.registry.len())
            .finish_non_exhaustive()
    }
}
