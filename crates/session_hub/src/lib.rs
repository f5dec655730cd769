//! # Session Hub - Real-time Session Server Core
//!
//! The connection and session layer of a multiplayer game backend. It accepts
//! WebSocket connections, admits them against an identity store, keeps one
//! session per player and routes compact delimited frames to message handlers.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Session Server** ([`SessionServer`]) - listener, accept loop, periodic broadcast
//! * **Session Hub** ([`SessionHub`]) - client registry plus the collaborators every task needs
//! * **Admission** - identity resolution, bans, one session per player, per-address limits
//! * **Pipeline** - reader, processor and writer tasks per client, joined by bounded queues
//! * **Dispatcher** - validates buffers and routes frames by type tag
//!
//! ### Message Flow
//!
//! 1. The reader task pulls a buffer off the socket into the client's inbound queue
//! 2. The processor validates the buffer (size, control bytes, UTF-8)
//! 3. The buffer is split into frames, each frame into fields
//! 4. Each frame is routed by its first field to a [`SessionHandlers`] method
//! 5. Handlers queue replies on the outbound queue of one or more clients
//! 6. The writer task drains the outbound queue onto the socket
//!
//! ### Wire Format
//!
//! Fields are joined with `U+FFFF` and frames with `U+FFFE`:
//!
//! ```rust
//! use session_hub::messaging::codec::encode_frame;
//!
//! assert_eq!(encode_frame(&["pc", "7"]), "pc\u{ffff}7");
//! ```
//!
//! ## Backpressure
//!
//! Every queue is bounded and nothing ever waits on a full one. A client that
//! cannot keep up has the overflowing frame dropped and is disconnected, so
//! one slow client can never stall a broadcast or another client's handler.
//!
//! ## Error Handling
//!
//! Structured error types in [`error`] categorize failures. Nothing but the
//! frames handlers choose to send is reported to clients; rejections and
//! processing failures go to the `access` log target.

pub use config::ServerConfig;
pub use connection::{ClientProfile, SessionClient};
pub use error::{AdmissionError, HandlerError, HandlerResult, ProtocolError, ServerError};
pub use handlers::{SessionHandlers, StandardHandlers};
pub use identity::{IdentityStore, MemoryIdentityStore};
pub use server::{SessionHub, SessionServer};

pub mod access_log;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod messaging;
pub mod scheduler;
pub mod server;

#[cfg(test)]
mod tests;
