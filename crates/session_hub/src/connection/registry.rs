//! Registry of connected clients.
//!
//! The registry is the single source of truth for who is connected. It is
//! shared by admission (insert), teardown (remove) and broadcast/accounting
//! (iterate), so it is backed by a sharded concurrent map instead of one
//! global lock.

use super::client::SessionClient;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Concurrent map from participant identifier to its live client.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<SessionClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client. Returns `false`, leaving the registry untouched,
    /// if its identifier is already taken.
    pub fn insert(&self, client: Arc<SessionClient>) -> bool {
        match self.clients.entry(client.uuid.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(client);
                true
            }
        }
    }

    /// Removes exactly this client.
    ///
    /// A teardown that runs late must not evict a newer session that has
    /// since registered under the same identifier, so removal compares the
    /// stored client by identity.
    pub fn remove(&self, client: &Arc<SessionClient>) -> bool {
        self.clients
            .remove_if(&client.uuid, |_, stored| Arc::ptr_eq(stored, client))
            .is_some()
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.clients.contains_key(uuid)
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<SessionClient>> {
        self.clients.get(uuid).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of registered clients connected from `ip`.
    pub fn count_by_ip(&self, ip: IpAddr) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().ip == ip)
            .count()
    }

    /// Clones every registered client out of the map.
    ///
    /// Callers iterate the snapshot without holding shard locks, so they may
    /// close or remove clients while walking it.
    pub fn snapshot(&self) -> Vec<Arc<SessionClient>> {
        self.clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
