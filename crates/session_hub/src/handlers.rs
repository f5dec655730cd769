//! Message handlers.
//!
//! The dispatcher routes each recognized type tag to one method of
//! [`SessionHandlers`]. Message handlers receive the whole field list, tag
//! included. [`StandardHandlers`] is a self-contained in-memory
//! implementation; deployments backed by a database provide their own.

use crate::connection::SessionClient;
use crate::error::{HandlerError, HandlerResult};
use crate::server::SessionHub;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LENGTH: usize = 12;

/// Longest accepted chat message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 150;

/// Business logic invoked by the dispatcher.
#[async_trait]
pub trait SessionHandlers: Send + Sync {
    /// `i`: the client asks for its own player info.
    async fn handle_i(&self, hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult;

    /// `name`: the client sets its display name.
    async fn handle_name(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult;

    /// `ploc`: the client reports its previous location.
    async fn handle_ploc(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult;

    /// `gsay`: global chat.
    async fn handle_gsay(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult;

    /// `psay`: party chat.
    async fn handle_psay(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult;

    /// `pt`: the client asks for its party state.
    async fn handle_pt(&self, hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult;

    /// `ep`: current event period.
    async fn handle_ep(&self, hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult;

    /// `e`: current event list.
    async fn handle_e(&self, hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult;

    /// Pushes party state to connected party members. Runs on every broadcast tick.
    async fn send_party_update(&self, hub: &SessionHub);
}

/// An event period as announced to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPeriod {
    pub ordinal: u32,
    pub end_date: String,
}

/// One entry of the event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: String,
    pub kind: u8,
    pub title: String,
    pub end_date: String,
}

/// In-memory handlers with process-local party and event state.
#[derive(Debug, Default)]
pub struct StandardHandlers {
    parties: DashMap<String, u32>,
    event_period: RwLock<Option<EventPeriod>>,
    events: RwLock<Vec<EventEntry>>,
}

impl StandardHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a player in a party, leaving any previous one.
    pub fn join_party(&self, uuid: &str, party_id: u32) {
        self.parties.insert(uuid.to_string(), party_id);
    }

    pub fn leave_party(&self, uuid: &str) {
        self.parties.remove(uuid);
    }

    pub fn party_of(&self, uuid: &str) -> Option<u32> {
        self.parties.get(uuid).map(|party| *party)
    }

    pub fn set_event_period(&self, period: Option<EventPeriod>) {
        if let Ok(mut current) = self.event_period.write() {
            *current = period;
        }
    }

    pub fn set_events(&self, events: Vec<EventEntry>) {
        if let Ok(mut current) = self.events.write() {
            *current = events;
        }
    }

    fn members_of(&self, party_id: u32) -> Vec<String> {
        let mut members: Vec<String> = self
            .parties
            .iter()
            .filter(|entry| *entry.value() == party_id)
            .map(|entry| entry.key().clone())
            .collect();
        members.sort();
        members
    }

    fn party_frame(&self, party_id: u32) -> Vec<String> {
        let mut frame = vec!["pt".to_string(), party_id.to_string()];
        frame.extend(self.members_of(party_id));
        frame
    }

    fn require_party(&self, sender: &SessionClient) -> Result<u32, HandlerError> {
        self.party_of(&sender.uuid)
            .ok_or_else(|| HandlerError::new("player not in a party"))
    }
}

fn expect_fields(msg: &[&str], count: usize) -> HandlerResult {
    if msg.len() != count {
        return Err(HandlerError::new("segment count mismatch"));
    }
    Ok(())
}

fn valid_name(name: &str) -> bool {
    let length = name.chars().count();
    (1..=MAX_NAME_LENGTH).contains(&length) && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn chat_message(raw: &str) -> Result<&str, HandlerError> {
    let message = raw.trim();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(HandlerError::new("invalid message"));
    }
    Ok(message)
}

#[async_trait]
impl SessionHandlers for StandardHandlers {
    async fn handle_i(&self, _hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult {
        let name = sender.name().await;
        sender.send_msg(&[
            "i",
            &sender.uuid,
            &sender.rank.to_string(),
            &sender.account.to_string(),
            &sender.badge,
            &name,
        ]);
        Ok(())
    }

    async fn handle_name(
        &self,
        _hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult {
        expect_fields(msg, 2)?;

        let mut state = sender.state_mut().await;
        if !state.name.is_empty() {
            return Err(HandlerError::new("name already set"));
        }
        if !valid_name(msg[1]) {
            return Err(HandlerError::new("invalid name"));
        }

        state.name = msg[1].to_string();
        Ok(())
    }

    async fn handle_ploc(
        &self,
        _hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult {
        expect_fields(msg, 3)?;

        if msg[1].len() != 4 || !msg[1].bytes().all(|b| b.is_ascii_digit()) {
            return Err(HandlerError::new("invalid prev map id"));
        }

        let mut state = sender.state_mut().await;
        state.prev_map_id = msg[1].to_string();
        state.prev_locations = msg[2].to_string();
        Ok(())
    }

    async fn handle_gsay(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult {
        expect_fields(msg, 2)?;

        if sender.muted {
            return Err(HandlerError::new("player is muted"));
        }
        let message = chat_message(msg[1])?;

        let (name, prev_map_id) = {
            let state = sender.state().await;
            (state.name.clone(), state.prev_map_id.clone())
        };
        if name.is_empty() {
            return Err(HandlerError::new("player has no name"));
        }

        hub.broadcast(&["gsay", &sender.uuid, &name, &prev_map_id, message]);
        Ok(())
    }

    async fn handle_psay(
        &self,
        hub: &SessionHub,
        sender: &Arc<SessionClient>,
        msg: &[&str],
    ) -> HandlerResult {
        expect_fields(msg, 2)?;

        if sender.muted {
            return Err(HandlerError::new("player is muted"));
        }
        let party_id = self.require_party(sender)?;
        let message = chat_message(msg[1])?;
        let name = sender.name().await;

        for member in self.members_of(party_id) {
            if let Some(client) = hub.get_client(&member) {
                client.send_msg(&["psay", &sender.uuid, &name, message]);
            }
        }
        Ok(())
    }

    async fn handle_pt(&self, _hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult {
        let party_id = self.require_party(sender)?;
        sender.send_msg(&self.party_frame(party_id));
        Ok(())
    }

    async fn handle_ep(&self, _hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult {
        let period = self
            .event_period
            .read()
            .ok()
            .and_then(|period| period.clone())
            .ok_or_else(|| HandlerError::new("no active event period"))?;

        sender.send_msg(&["ep", &period.ordinal.to_string(), &period.end_date]);
        Ok(())
    }

    async fn handle_e(&self, _hub: &SessionHub, sender: &Arc<SessionClient>) -> HandlerResult {
        let has_period = self
            .event_period
            .read()
            .map(|period| period.is_some())
            .unwrap_or(false);
        if !has_period {
            return Err(HandlerError::new("no active event period"));
        }

        let events = self
            .events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default();
        let payload =
            serde_json::to_string(&events).map_err(|e| HandlerError::new(e.to_string()))?;

        sender.send_msg(&["e", &payload]);
        Ok(())
    }

    async fn send_party_update(&self, hub: &SessionHub) {
        let mut party_ids: Vec<u32> = self.parties.iter().map(|entry| *entry.value()).collect();
        party_ids.sort_unstable();
        party_ids.dedup();

        for party_id in party_ids {
            let frame = self.party_frame(party_id);
            for member in &frame[2..] {
                if let Some(client) = hub.get_client(member) {
                    client.send_msg(&frame);
                }
            }
        }
        debug!("Party update pushed");
    }
}
