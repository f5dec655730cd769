//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and the default
//! limits the session hub runs with.

use std::net::SocketAddr;
use std::time::Duration;

/// Maximum number of simultaneous sessions sharing one client address.
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: usize = 3;

/// Capacity of each client's inbound and outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Largest inbound buffer accepted, in bytes.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 4096;

/// Interval between player-count broadcasts, in milliseconds.
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 5000;

/// Configuration structure for the session server.
///
/// Contains the network settings and the per-client resource limits applied
/// by admission and by the per-connection pipeline.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Registered sessions allowed per client address
    pub max_connections_per_ip: usize,

    /// Bound of the inbound and outbound queues of every client
    pub queue_capacity: usize,

    /// Inbound buffers larger than this are rejected wholesale
    pub max_request_size: usize,

    /// Player-count broadcast interval in milliseconds
    pub broadcast_interval_ms: u64,

    /// Take the client address from `X-Forwarded-For` (reverse proxy deployments)
    pub trust_forwarded_for: bool,
}

impl ServerConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            trust_forwarded_for: false,
        }
    }
}
