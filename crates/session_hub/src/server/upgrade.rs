//! WebSocket upgrade handling.
//!
//! Reads what admission needs from the HTTP upgrade request (session token,
//! requested subprotocol, forwarded client address), completes the handshake
//! and hands the connection to [`SessionHub::add_client`].

use super::hub::SessionHub;
use crate::connection::Transport;
use crate::error::ServerError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, warn};
use url::form_urlencoded;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Multiple of the request size limit the transport will buffer. Messages up
/// to this size reach the codec, which drops oversized buffers and keeps the
/// session; anything larger fails the read and ends the session.
const TRANSPORT_SIZE_FACTOR: usize = 16;

/// WebSocket limits derived from the largest accepted request.
pub fn websocket_config(max_request_size: usize) -> WebSocketConfig {
    let limit = max_request_size.saturating_mul(TRANSPORT_SIZE_FACTOR);
    WebSocketConfig::default()
        .max_message_size(Some(limit))
        .max_frame_size(Some(limit))
}

/// What the upgrade request tells us about the connecting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Decoded `token` query parameter, if present
    pub token: Option<String>,
    /// First subprotocol the client offered
    pub subprotocol: Option<String>,
    /// First address in `X-Forwarded-For`
    pub forwarded_for: Option<IpAddr>,
}

impl UpgradeRequest {
    pub fn from_request(req: &Request) -> Self {
        let token = req.uri().query().and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        });

        let subprotocol = req
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let forwarded_for = req
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse().ok());

        Self {
            token,
            subprotocol,
            forwarded_for,
        }
    }

    /// Address used for bans and per-address limits.
    pub fn client_ip(&self, remote_addr: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
        match self.forwarded_for {
            Some(ip) if trust_forwarded_for => ip,
            _ => remote_addr.ip(),
        }
    }
}

/// Upgrades an accepted stream and runs it through admission.
///
/// A rejected admission is not an error here; it has already been logged and
/// the connection closed.
pub async fn handle_connection<S>(
    stream: S,
    remote_addr: SocketAddr,
    hub: Arc<SessionHub>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut upgrade = UpgradeRequest::default();

    let ws = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            upgrade = UpgradeRequest::from_request(req);
            if let Some(protocol) = &upgrade.subprotocol {
                match HeaderValue::from_str(protocol) {
                    Ok(value) => {
                        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                    }
                    Err(e) => warn!("Unusable subprotocol from {}: {}", remote_addr, e),
                }
            }
            Ok(response)
        },
        Some(websocket_config(hub.config().max_request_size)),
    )
    .await
    .map_err(|e| ServerError::Network(format!("WebSocket handshake failed for {remote_addr}: {e}")))?;

    let ip = upgrade.client_ip(remote_addr, hub.config().trust_forwarded_for);
    debug!("🔗 Upgraded connection from {} (client ip {})", remote_addr, ip);

    let _ = hub
        .add_client(
            Transport::from_websocket(ws),
            remote_addr,
            ip,
            upgrade.token.as_deref(),
        )
        .await;

    Ok(())
}
