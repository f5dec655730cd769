//! Connection management for admitted clients.
//!
//! This module holds the per-client session state, the registry of live
//! clients, the transport abstraction over upgraded sockets and the task
//! pipeline that moves frames between them.

pub mod client;
pub mod pipeline;
pub mod registry;
pub mod transport;

pub use client::{ClientProfile, SessionClient, SessionState};
pub use registry::ClientRegistry;
pub use transport::Transport;

/// Session-local client identifier.
///
/// Assigned at admission and never reused while the server runs.
pub type ClientId = usize;
