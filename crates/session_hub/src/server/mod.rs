//! Session server and its shared hub.
//!
//! * [`core`] - listener, accept loop and lifecycle
//! * [`upgrade`] - WebSocket handshake and request inspection
//! * [`admission`] - identity resolution and admission limits
//! * [`hub`] - state shared by every connection task

pub mod admission;
pub mod core;
pub mod hub;
pub mod upgrade;

pub use self::core::SessionServer;
pub use hub::SessionHub;
pub use upgrade::{handle_connection, UpgradeRequest};
