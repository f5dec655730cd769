//! Per-connection session state.
//!
//! A [`SessionClient`] is created once a connection passes admission and lives
//! until its reader or writer task terminates. Identity and cosmetic fields
//! are fixed at creation; only [`SessionState`] changes afterwards.

use super::ClientId;
use crate::identity::GameData;
use crate::messaging::codec::encode_frame;
use std::net::{IpAddr, SocketAddr};
use std::time::SystemTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Identity and cosmetic data a client is admitted with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProfile {
    pub uuid: String,
    pub name: String,
    pub rank: i32,
    pub badge: String,
    pub account: bool,
    pub muted: bool,
    pub game: GameData,
}

/// Fields owned by message handlers that change during a session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub name: String,
    pub prev_map_id: String,
    pub prev_locations: String,
}

/// A live, registered connection.
#[derive(Debug)]
pub struct SessionClient {
    /// Session-local id, unique among connected clients
    pub id: ClientId,
    pub uuid: String,
    pub rank: i32,
    pub badge: String,
    /// Authenticated with a token rather than anonymous by address
    pub account: bool,
    pub muted: bool,
    pub sprite_name: String,
    pub sprite_index: i32,
    pub system_name: String,

    /// Address used for per-IP accounting and logging
    pub ip: IpAddr,
    /// Peer address of the underlying socket
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,

    state: RwLock<SessionState>,
    send: mpsc::Sender<String>,
    closed: watch::Sender<bool>,
}

impl SessionClient {
    /// Creates a client and the receiving end of its outbound queue.
    pub fn new(
        id: ClientId,
        profile: ClientProfile,
        ip: IpAddr,
        remote_addr: SocketAddr,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (send, outbound) = mpsc::channel(queue_capacity.max(1));
        let (closed, _) = watch::channel(false);

        let client = Self {
            id,
            uuid: profile.uuid,
            rank: profile.rank,
            badge: profile.badge,
            account: profile.account,
            muted: profile.muted,
            sprite_name: profile.game.sprite_name,
            sprite_index: profile.game.sprite_index,
            system_name: profile.game.system_name,
            ip,
            remote_addr,
            connected_at: SystemTime::now(),
            state: RwLock::new(SessionState {
                name: profile.name,
                ..Default::default()
            }),
            send,
            closed,
        };

        (client, outbound)
    }

    /// Queues a frame for the writer task.
    ///
    /// Never waits for queue space. A full queue means the writer has stalled,
    /// so the frame is dropped and the client is closed. Returns whether the
    /// frame was queued.
    pub fn send_msg<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        if self.is_closed() {
            return false;
        }

        match self.send.try_send(encode_frame(fields)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "📪 Outbound queue full for client {} ({}), closing",
                    self.id, self.uuid
                );
                self.close();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Raises the shared close signal. Returns `true` for the first caller only.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the client has been closed.
    pub async fn closed(&self) {
        let mut signal = self.closed.subscribe();
        loop {
            if *signal.borrow_and_update() {
                return;
            }
            if signal.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().await
    }

    pub async fn state_mut(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().await
    }

    pub async fn name(&self) -> String {
        self.state.read().await.name.clone()
    }
}
