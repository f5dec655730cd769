//! Wire format and message dispatch.
//!
//! [`codec`] validates and splits inbound buffers and encodes outbound frames.
//! [`router`] routes decoded frames to the message handlers.

pub mod codec;
pub mod router;

pub use codec::{decode, encode_frame, Frame, FIELD_DELIMITER, MESSAGE_DELIMITER};
pub use router::MessageType;
