//! Admission control for new connections.
//!
//! A connection is resolved to an identity (account token first, anonymous
//! by address otherwise), checked against bans, existing sessions and the
//! per-address limit, then registered and handed its pipeline.
//!
//! Every rejection is silent to the peer: the transport is closed without a
//! handshake frame and the reason only appears in the server's access log.

use super::hub::SessionHub;
use crate::access_log::{write_err_log, write_log};
use crate::connection::{pipeline, ClientProfile, SessionClient, Transport};
use crate::error::AdmissionError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

/// Length of a valid session token.
pub const TOKEN_LENGTH: usize = 32;

/// Badge value announced for players without a badge.
pub const NO_BADGE: &str = "null";

/// Identity resolved for a connection, before limits are checked.
#[derive(Debug)]
struct ResolvedIdentity {
    profile: ClientProfile,
    banned: bool,
}

impl SessionHub {
    /// Admits a connection or rejects it.
    ///
    /// On success the client is registered, its `s` handshake frame is queued
    /// and its reader, writer and processor tasks are running.
    pub async fn add_client(
        self: &Arc<Self>,
        transport: Transport,
        remote_addr: SocketAddr,
        ip: IpAddr,
        token: Option<&str>,
    ) -> Result<Arc<SessionClient>, AdmissionError> {
        match self.admit(ip, remote_addr, token).await {
            Ok((client, outbound)) => {
                client.send_msg(&[
                    "s",
                    &client.uuid,
                    &client.rank.to_string(),
                    &client.account.to_string(),
                    &client.badge,
                ]);

                pipeline::spawn(self.clone(), client.clone(), transport, outbound);

                write_log(ip, "session", "connect", 200);
                Ok(client)
            }
            Err(e) => {
                write_err_log(ip, "session", &e);
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn admit(
        &self,
        ip: IpAddr,
        remote_addr: SocketAddr,
        token: Option<&str>,
    ) -> Result<(Arc<SessionClient>, tokio::sync::mpsc::Receiver<String>), AdmissionError> {
        let ResolvedIdentity {
            mut profile,
            banned,
        } = self.resolve_identity(ip, token).await?;

        if banned {
            return Err(AdmissionError::Banned);
        }

        profile.game = match self.identity().game_data(&profile.uuid).await {
            Ok(game) => game,
            Err(e) => {
                warn!("Failed to load game data for {}: {}", profile.uuid, e);
                Default::default()
            }
        };

        if profile.badge.is_empty() {
            profile.badge = NO_BADGE.to_string();
        }

        // Duplicate check, address count, id assignment and registration
        // happen under one lock so concurrent admissions cannot interleave.
        let mut last_id = self.last_id.lock().await;

        if self.registry().contains(&profile.uuid) {
            return Err(AdmissionError::DuplicateSession);
        }

        if self.registry().count_by_ip(ip) >= self.config().max_connections_per_ip {
            return Err(AdmissionError::TooManyConnections);
        }

        let id = *last_id;
        *last_id += 1;

        let (client, outbound) = SessionClient::new(
            id,
            profile,
            ip,
            remote_addr,
            self.config().queue_capacity,
        );
        let client = Arc::new(client);

        if !self.registry().insert(client.clone()) {
            return Err(AdmissionError::DuplicateSession);
        }

        Ok((client, outbound))
    }

    async fn resolve_identity(
        &self,
        ip: IpAddr,
        token: Option<&str>,
    ) -> Result<ResolvedIdentity, AdmissionError> {
        if let Some(token) = token.filter(|token| token.len() == TOKEN_LENGTH) {
            match self.identity().player_by_token(token).await {
                Ok(Some(account)) if !account.uuid.is_empty() => {
                    return Ok(ResolvedIdentity {
                        banned: account.banned,
                        profile: ClientProfile {
                            uuid: account.uuid,
                            name: account.name,
                            rank: account.rank,
                            badge: account.badge,
                            account: true,
                            muted: account.muted,
                            game: Default::default(),
                        },
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Token lookup failed for {}, continuing anonymously: {}", ip, e),
            }
        }

        let player = self
            .identity()
            .player_by_address(ip)
            .await
            .map_err(|e| AdmissionError::IdentityUnavailable(e.to_string()))?;

        Ok(ResolvedIdentity {
            banned: player.banned,
            profile: ClientProfile {
                uuid: player.uuid,
                muted: player.muted,
                ..Default::default()
            },
        })
    }
}
