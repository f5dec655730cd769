//! Per-connection task pipeline.
//!
//! Each admitted client runs three tasks:
//!
//! * **reader** - pulls messages off the transport into the inbound queue
//! * **processor** - drains the inbound queue through the dispatcher, one
//!   buffer at a time, so a client's frames are handled in arrival order
//! * **writer** - drains the outbound queue onto the transport
//!
//! All three stop on the client's close signal, including the writer while it
//! is blocked on a slow transport. The reader and writer tear the client down
//! when they stop for any other reason, and the writer always closes the
//! transport on its way out.

use super::client::SessionClient;
use super::transport::{FrameSink, FrameStream, Transport};
use crate::access_log::write_err_log;
use crate::server::SessionHub;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// How long the writer waits for the transport to close once the client is
/// torn down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Starts the reader, processor and writer tasks for an admitted client.
pub fn spawn(
    hub: Arc<SessionHub>,
    client: Arc<SessionClient>,
    transport: Transport,
    outbound: mpsc::Receiver<String>,
) {
    let (sink, stream) = transport.into_split();
    let (inbound_tx, inbound_rx) = mpsc::channel(hub.config().queue_capacity.max(1));

    tokio::spawn(read_loop(hub.clone(), client.clone(), stream, inbound_tx));
    tokio::spawn(process_loop(hub.clone(), client.clone(), inbound_rx));
    tokio::spawn(write_loop(hub, client, sink, outbound));
}

async fn read_loop(
    hub: Arc<SessionHub>,
    client: Arc<SessionClient>,
    mut stream: FrameStream,
    inbound: mpsc::Sender<Vec<u8>>,
) {
    loop {
        let msg = tokio::select! {
            _ = client.closed() => break,
            msg = stream.next() => msg,
        };

        let data = match msg {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
            Some(Ok(Message::Close(_))) => {
                debug!("Client {} requested close", client.id);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("Read error for client {}: {}", client.id, e);
                break;
            }
            None => break,
        };

        match inbound.try_send(data) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    "📥 Inbound queue full for client {} ({}), closing",
                    client.id, client.uuid
                );
                break;
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    hub.teardown(&client);
}

async fn process_loop(
    hub: Arc<SessionHub>,
    client: Arc<SessionClient>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
) {
    loop {
        let data = tokio::select! {
            _ = client.closed() => break,
            data = inbound.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        for err in hub.process_msgs(&client, &data).await {
            write_err_log(client.ip, "session", &err);
        }
    }
}

async fn write_loop(
    hub: Arc<SessionHub>,
    client: Arc<SessionClient>,
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<String>,
) {
    loop {
        let frame = tokio::select! {
            _ = client.closed() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = client.closed() => break,
            sent = sink.send(Message::text(frame)) => sent,
        };
        if let Err(e) = sent {
            debug!("Write error for client {}: {}", client.id, e);
            break;
        }
    }

    // a peer that stopped reading can also stall the close handshake
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("Close timed out for client {}, dropping transport", client.id);
    }
    hub.teardown(&client);
}
