//! Message routing logic for dispatching client frames to handlers.
//!
//! This module validates inbound buffers, splits them into frames and routes
//! each frame by its type tag to the matching [`SessionHandlers`] method.
//!
//! [`SessionHandlers`]: crate::handlers::SessionHandlers

use crate::access_log::write_log;
use crate::connection::SessionClient;
use crate::error::ProtocolError;
use crate::messaging::codec::{self, Frame};
use crate::server::SessionHub;
use std::sync::Arc;
use tracing::debug;

/// Type tags understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `i` - own player info
    PlayerInfo,
    /// `name` - set display name
    Name,
    /// `ploc` - previous location
    PreviousLocation,
    /// `gsay` - global chat
    GlobalSay,
    /// `psay` - party chat
    PartySay,
    /// `pt` - party state
    Party,
    /// `ep` - event period
    EventPeriod,
    /// `e` - event list
    EventList,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        Self::PlayerInfo,
        Self::Name,
        Self::PreviousLocation,
        Self::GlobalSay,
        Self::PartySay,
        Self::Party,
        Self::EventPeriod,
        Self::EventList,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "i" => Some(Self::PlayerInfo),
            "name" => Some(Self::Name),
            "ploc" => Some(Self::PreviousLocation),
            "gsay" => Some(Self::GlobalSay),
            "psay" => Some(Self::PartySay),
            "pt" => Some(Self::Party),
            "ep" => Some(Self::EventPeriod),
            "e" => Some(Self::EventList),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::PlayerInfo => "i",
            Self::Name => "name",
            Self::PreviousLocation => "ploc",
            Self::GlobalSay => "gsay",
            Self::PartySay => "psay",
            Self::Party => "pt",
            Self::EventPeriod => "ep",
            Self::EventList => "e",
        }
    }
}

impl SessionHub {
    /// Processes one received buffer from `sender`.
    ///
    /// A buffer failing validation is discarded as a whole and yields a single
    /// error. Otherwise every frame is dispatched in order, and the errors of
    /// failing frames are collected without stopping their siblings.
    pub async fn process_msgs(
        &self,
        sender: &Arc<SessionClient>,
        data: &[u8],
    ) -> Vec<ProtocolError> {
        let frames = match codec::decode(data, self.config().max_request_size) {
            Ok(frames) => frames,
            Err(e) => return vec![e],
        };

        let mut errs = Vec::new();
        for frame in &frames {
            if let Err(e) = self.process_msg(sender, frame).await {
                errs.push(e);
            }
        }
        errs
    }

    /// Routes a single frame to its handler.
    ///
    /// A frame without any fields is ignored; an empty frame still carries an
    /// empty tag and is rejected as unknown. A failing `pt` request
    /// additionally tells the client it has no party.
    pub async fn process_msg(
        &self,
        sender: &Arc<SessionClient>,
        frame: &Frame<'_>,
    ) -> Result<(), ProtocolError> {
        let Some(tag) = frame.tag() else {
            return Ok(());
        };

        let message_type = MessageType::from_tag(tag)
            .ok_or_else(|| ProtocolError::UnknownMessageType(tag.to_string()))?;

        debug!(
            "📨 Routing '{}' from client {} ({})",
            tag, sender.id, sender.uuid
        );

        let handlers = self.handlers();
        let msg = frame.fields();
        let result = match message_type {
            MessageType::PlayerInfo => handlers.handle_i(self, sender).await,
            MessageType::Name => handlers.handle_name(self, sender, msg).await,
            MessageType::PreviousLocation => handlers.handle_ploc(self, sender, msg).await,
            MessageType::GlobalSay => handlers.handle_gsay(self, sender, msg).await,
            MessageType::PartySay => handlers.handle_psay(self, sender, msg).await,
            MessageType::Party => {
                let result = handlers.handle_pt(self, sender).await;
                if result.is_err() {
                    sender.send_msg(&["pt", "null"]);
                }
                result
            }
            MessageType::EventPeriod => handlers.handle_ep(self, sender).await,
            MessageType::EventList => handlers.handle_e(self, sender).await,
        };

        result.map_err(|e| ProtocolError::Handler {
            tag: message_type.tag(),
            reason: e.to_string(),
        })?;

        write_log(sender.ip, "session", frame.raw(), 200);
        Ok(())
    }
}
