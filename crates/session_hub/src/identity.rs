//! Identity store seam.
//!
//! Admission resolves who a connection belongs to through [`IdentityStore`]:
//! account lookup by session token, anonymous get-or-create by address, and
//! the per-player game data a client is created with.
//!
//! [`MemoryIdentityStore`] keeps everything in process and can be seeded
//! from a JSON accounts file.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Errors reported by identity store implementations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read accounts file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse accounts file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<IdentityError> for crate::error::ServerError {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e.to_string())
    }
}

/// An authenticated account resolved from a session token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub badge: String,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub muted: bool,
}

/// An anonymous player keyed by client address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnonymousIdentity {
    pub uuid: String,
    pub banned: bool,
    pub muted: bool,
}

/// Cosmetic game state restored when a player connects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default)]
    pub sprite_name: String,
    #[serde(default)]
    pub sprite_index: i32,
    #[serde(default)]
    pub system_name: String,
}

/// Lookups the admission controller depends on.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Resolves a session token. `Ok(None)` means the token is unknown.
    async fn player_by_token(&self, token: &str) -> Result<Option<AccountIdentity>, IdentityError>;

    /// Returns the anonymous player for an address, creating one if needed.
    async fn player_by_address(&self, ip: IpAddr) -> Result<AnonymousIdentity, IdentityError>;

    async fn game_data(&self, uuid: &str) -> Result<GameData, IdentityError>;
}

/// One entry of a JSON accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub token: String,
    #[serde(flatten)]
    pub identity: AccountIdentity,
    #[serde(default)]
    pub game: GameData,
}

/// Process-local identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    accounts: DashMap<String, AccountIdentity>,
    anonymous: DashMap<IpAddr, AnonymousIdentity>,
    banned_addresses: DashSet<IpAddr>,
    muted_addresses: DashSet<IpAddr>,
    game_data: DashMap<String, GameData>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a JSON array of [`AccountRecord`]s.
    pub async fn from_accounts_file(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let records: Vec<AccountRecord> = serde_json::from_str(&content)?;

        let store = Self::new();
        let count = records.len();
        for record in records {
            store.set_game_data(&record.identity.uuid, record.game);
            store.register_account(record.token, record.identity);
        }

        info!(
            "🔑 Loaded {} account(s) from {}",
            count,
            path.as_ref().display()
        );
        Ok(store)
    }

    pub fn register_account(&self, token: impl Into<String>, identity: AccountIdentity) {
        self.accounts.insert(token.into(), identity);
    }

    /// Bans the anonymous player of an address, existing or future.
    pub fn ban_address(&self, ip: IpAddr) {
        self.banned_addresses.insert(ip);
        if let Some(mut player) = self.anonymous.get_mut(&ip) {
            player.banned = true;
        }
    }

    pub fn mute_address(&self, ip: IpAddr) {
        self.muted_addresses.insert(ip);
        if let Some(mut player) = self.anonymous.get_mut(&ip) {
            player.muted = true;
        }
    }

    pub fn set_game_data(&self, uuid: &str, data: GameData) {
        self.game_data.insert(uuid.to_string(), data);
    }

    pub fn anonymous_count(&self) -> usize {
        self.anonymous.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn player_by_token(&self, token: &str) -> Result<Option<AccountIdentity>, IdentityError> {
        Ok(self.accounts.get(token).map(|account| account.clone()))
    }

    async fn player_by_address(&self, ip: IpAddr) -> Result<AnonymousIdentity, IdentityError> {
        let player = self
            .anonymous
            .entry(ip)
            .or_insert_with(|| AnonymousIdentity {
                uuid: Uuid::new_v4().simple().to_string(),
                banned: self.banned_addresses.contains(&ip),
                muted: self.muted_addresses.contains(&ip),
            });
        Ok(player.clone())
    }

    async fn game_data(&self, uuid: &str) -> Result<GameData, IdentityError> {
        Ok(self
            .game_data
            .get(uuid)
            .map(|data| data.clone())
            .unwrap_or_default())
    }
}
