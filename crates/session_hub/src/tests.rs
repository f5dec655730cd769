//! Hub-level tests: admission, dispatch and broadcast over in-memory transports.

use crate::config::ServerConfig;
use crate::connection::transport::memory::{pair, Peer};
use crate::connection::{SessionClient, Transport};
use crate::error::{AdmissionError, HandlerError, HandlerResult, ProtocolError};
use crate::handlers::SessionHandlers;
use crate::identity::{AccountIdentity, MemoryIdentityStore};
use crate::messaging::codec::{FIELD_DELIMITER as F, MESSAGE_DELIMITER as M};
use crate::server::SessionHub;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Handlers that record what was dispatched. `pt` always fails, and `gsay`
/// never returns once `stall_chat` is set.
#[derive(Default)]
struct RecordingHandlers {
    calls: Mutex<Vec<String>>,
    party_updates: Mutex<usize>,
    stall_chat: AtomicBool,
}

impl RecordingHandlers {
    fn record(&self, tag: &str) -> HandlerResult {
        self.calls.lock().unwrap().push(tag.to_string());
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionHandlers for RecordingHandlers {
    async fn handle_i(&self, _: &SessionHub, _: &Arc<SessionClient>) -> HandlerResult {
        self.record("i")
    }

    async fn handle_name(&self, _: &SessionHub, _: &Arc<SessionClient>, msg: &[&str]) -> HandlerResult {
        self.record(&msg.join("|"))
    }

    async fn handle_ploc(&self, _: &SessionHub, _: &Arc<SessionClient>, msg: &[&str]) -> HandlerResult {
        self.record(&msg.join("|"))
    }

    async fn handle_gsay(&self, _: &SessionHub, _: &Arc<SessionClient>, msg: &[&str]) -> HandlerResult {
        self.record(&msg.join("|"))?;
        if self.stall_chat.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn handle_psay(&self, _: &SessionHub, _: &Arc<SessionClient>, _: &[&str]) -> HandlerResult {
        self.record("psay")
    }

    async fn handle_pt(&self, _: &SessionHub, _: &Arc<SessionClient>) -> HandlerResult {
        self.calls.lock().unwrap().push("pt".to_string());
        Err(HandlerError::new("player not in a party"))
    }

    async fn handle_ep(&self, _: &SessionHub, _: &Arc<SessionClient>) -> HandlerResult {
        self.record("ep")
    }

    async fn handle_e(&self, _: &SessionHub, _: &Arc<SessionClient>) -> HandlerResult {
        self.record("e")
    }

    async fn send_party_update(&self, _: &SessionHub) {
        *self.party_updates.lock().unwrap() += 1;
    }
}

struct Fixture {
    hub: Arc<SessionHub>,
    store: Arc<MemoryIdentityStore>,
    handlers: Arc<RecordingHandlers>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryIdentityStore::new());
    let handlers = Arc::new(RecordingHandlers::default());
    let hub = Arc::new(SessionHub::new(
        ServerConfig::default(),
        store.clone(),
        handlers.clone(),
    ));
    Fixture {
        hub,
        store,
        handlers,
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::from([192, 0, 2, last])
}

fn token(n: u8) -> String {
    format!("{:032}", n)
}

fn account(uuid: &str) -> AccountIdentity {
    AccountIdentity {
        uuid: uuid.to_string(),
        name: uuid.to_string(),
        rank: 1,
        ..Default::default()
    }
}

async fn connect(
    hub: &Arc<SessionHub>,
    ip: IpAddr,
    token: Option<&str>,
) -> (Result<Arc<SessionClient>, AdmissionError>, Peer) {
    let (transport, peer) = pair();
    let result = hub
        .add_client(transport, SocketAddr::new(ip, 50000), ip, token)
        .await;
    (result, peer)
}

/// Next text frame the server wrote, or `None` once the transport is closed.
async fn next_text(peer: &mut Peer) -> Option<String> {
    let msg = tokio::time::timeout(Duration::from_secs(2), peer.outbound.next())
        .await
        .expect("timed out waiting for server output")?;
    match msg {
        Message::Text(text) => Some(text.as_str().to_owned()),
        other => panic!("unexpected message: {other:?}"),
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn anonymous_client_receives_hello() {
    let fx = fixture();
    let (client, mut peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();

    assert_eq!(fx.hub.client_count(), 1);
    assert!(!client.account);
    assert_eq!(
        next_text(&mut peer).await.unwrap(),
        format!("s{F}{}{F}0{F}false{F}null", client.uuid)
    );
}

#[tokio::test]
async fn account_client_is_announced_as_account() {
    let fx = fixture();
    fx.store.register_account(token(1), account("alice"));

    let (client, mut peer) = connect(&fx.hub, ip(1), Some(&token(1))).await;
    let client = client.unwrap();

    assert_eq!(client.uuid, "alice");
    assert_eq!(client.name().await, "alice");
    assert_eq!(
        next_text(&mut peer).await.unwrap(),
        format!("s{F}alice{F}1{F}true{F}null")
    );
}

#[tokio::test]
async fn short_token_is_treated_as_anonymous() {
    let fx = fixture();
    fx.store.register_account("short", account("alice"));

    let (client, _peer) = connect(&fx.hub, ip(1), Some("short")).await;
    assert!(!client.unwrap().account);
}

#[tokio::test]
async fn duplicate_session_is_rejected_silently() {
    let fx = fixture();
    fx.store.register_account(token(1), account("alice"));

    let (first, _first_peer) = connect(&fx.hub, ip(1), Some(&token(1))).await;
    assert!(first.is_ok());

    let (second, mut second_peer) = connect(&fx.hub, ip(2), Some(&token(1))).await;
    assert_eq!(second.unwrap_err(), AdmissionError::DuplicateSession);
    assert_eq!(fx.hub.client_count(), 1);
    // closed without a hello frame
    assert_eq!(next_text(&mut second_peer).await, None);
}

#[tokio::test]
async fn banned_player_is_rejected() {
    let fx = fixture();
    fx.store.ban_address(ip(1));

    let (result, mut peer) = connect(&fx.hub, ip(1), None).await;
    assert_eq!(result.unwrap_err(), AdmissionError::Banned);
    assert_eq!(fx.hub.client_count(), 0);
    assert_eq!(next_text(&mut peer).await, None);
}

#[tokio::test]
async fn banned_account_is_rejected_by_token() {
    let fx = fixture();
    fx.store.register_account(
        token(1),
        AccountIdentity {
            banned: true,
            ..account("mallory")
        },
    );

    let (result, mut peer) = connect(&fx.hub, ip(1), Some(&token(1))).await;
    assert_eq!(result.unwrap_err(), AdmissionError::Banned);
    assert_eq!(fx.hub.client_count(), 0);
    assert_eq!(next_text(&mut peer).await, None);

    // the ban belongs to the account, not the address
    let (result, _other) = connect(&fx.hub, ip(1), None).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn fourth_connection_from_one_address_is_rejected() {
    let fx = fixture();
    for n in 0..4 {
        fx.store
            .register_account(token(n), account(&format!("player{n}")));
    }

    let mut peers = Vec::new();
    for n in 0..3 {
        let (result, peer) = connect(&fx.hub, ip(1), Some(&token(n))).await;
        assert!(result.is_ok());
        peers.push(peer);
    }

    let (result, _peer) = connect(&fx.hub, ip(1), Some(&token(3))).await;
    assert_eq!(result.unwrap_err(), AdmissionError::TooManyConnections);
    assert_eq!(fx.hub.registry().count_by_ip(ip(1)), 3);

    // another address is unaffected
    let (result, _other) = connect(&fx.hub, ip(2), Some(&token(3))).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn ids_are_not_reused() {
    let fx = fixture();
    let (first, peer) = connect(&fx.hub, ip(1), None).await;
    let first = first.unwrap();

    drop(peer);
    eventually(|| fx.hub.client_count() == 0).await;

    let (second, _peer) = connect(&fx.hub, ip(1), None).await;
    let second = second.unwrap();
    assert_eq!(first.uuid, second.uuid);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn mixed_buffer_dispatches_each_frame() {
    let fx = fixture();
    let (client, _peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();

    let buffer = format!("gsay{F}hi{M}badtag{F}x");
    let errs = fx.hub.process_msgs(&client, buffer.as_bytes()).await;

    assert_eq!(errs, vec![ProtocolError::UnknownMessageType("badtag".into())]);
    assert_eq!(fx.handlers.calls(), vec!["gsay|hi"]);
}

#[tokio::test]
async fn invalid_buffers_dispatch_nothing() {
    let fx = fixture();
    let (client, _peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();

    let control = format!("gsay{F}hi\n");
    assert_eq!(
        fx.hub.process_msgs(&client, control.as_bytes()).await,
        vec![ProtocolError::BadByteSequence]
    );

    let oversized = format!("gsay{F}{}", "x".repeat(4096));
    assert_eq!(
        fx.hub.process_msgs(&client, oversized.as_bytes()).await,
        vec![ProtocolError::BadRequestSize]
    );

    assert_eq!(
        fx.hub.process_msgs(&client, &[b'i', 0xc3, 0x28]).await,
        vec![ProtocolError::InvalidUtf8]
    );

    assert!(fx.handlers.calls().is_empty());
}

#[tokio::test]
async fn empty_frames_are_unknown_messages() {
    let fx = fixture();
    let (client, _peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();

    let buffer = format!("{M}i{M}");
    assert_eq!(
        fx.hub.process_msgs(&client, buffer.as_bytes()).await,
        vec![
            ProtocolError::UnknownMessageType(String::new()),
            ProtocolError::UnknownMessageType(String::new()),
        ]
    );
    assert_eq!(fx.handlers.calls(), vec!["i"]);
}

#[tokio::test]
async fn repeated_frames_are_routed_identically() {
    let fx = fixture();
    let (client, _peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();

    let ploc = format!("ploc{F}0042{F}1,2");
    let name = format!("name{F}alice");
    for buffer in [&ploc, &ploc, &name, &name] {
        assert!(fx.hub.process_msgs(&client, buffer.as_bytes()).await.is_empty());
    }

    assert_eq!(
        fx.handlers.calls(),
        vec!["ploc|0042|1,2", "ploc|0042|1,2", "name|alice", "name|alice"]
    );
}

#[tokio::test]
async fn failed_party_request_reports_no_party() {
    let fx = fixture();
    let (client, mut peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();
    next_text(&mut peer).await; // hello

    let errs = fx.hub.process_msgs(&client, b"pt").await;
    assert_eq!(
        errs,
        vec![ProtocolError::Handler {
            tag: "pt",
            reason: "player not in a party".into()
        }]
    );
    assert_eq!(next_text(&mut peer).await.unwrap(), format!("pt{F}null"));
}

#[tokio::test]
async fn frames_from_socket_reach_handlers_in_order() {
    let fx = fixture();
    let (_client, peer) = connect(&fx.hub, ip(1), None).await;

    for msg in ["gsay\u{ffff}one", "gsay\u{ffff}two", "gsay\u{ffff}three"] {
        peer.inbound.unbounded_send(Ok(Message::text(msg))).unwrap();
    }

    let handlers = fx.handlers.clone();
    eventually(|| handlers.calls().len() == 3).await;
    assert_eq!(
        fx.handlers.calls(),
        vec!["gsay|one", "gsay|two", "gsay|three"]
    );
}

#[tokio::test]
async fn close_frame_tears_client_down() {
    let fx = fixture();
    let (client, mut peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();
    next_text(&mut peer).await;

    peer.inbound.unbounded_send(Ok(Message::Close(None))).unwrap();

    eventually(|| fx.hub.client_count() == 0).await;
    assert!(client.is_closed());
    // writer closed the transport
    assert_eq!(next_text(&mut peer).await, None);
}

#[tokio::test]
async fn full_inbound_queue_closes_client() {
    let fx = fixture();
    fx.handlers.stall_chat.store(true, Ordering::SeqCst);
    let (client, mut peer) = connect(&fx.hub, ip(1), None).await;
    let client = client.unwrap();
    next_text(&mut peer).await; // hello

    // the processor blocks on the first frame it takes, so the rest pile up
    for n in 0..40 {
        peer.inbound
            .unbounded_send(Ok(Message::text(format!("gsay{F}{n}"))))
            .unwrap();
    }

    eventually(|| fx.hub.client_count() == 0).await;
    assert!(client.is_closed());
    assert!(fx.handlers.calls().len() <= 1);
    // writer closed the transport
    assert_eq!(next_text(&mut peer).await, None);
}

#[tokio::test]
async fn stalled_transport_is_closed_on_teardown() {
    let fx = fixture();

    // a zero-buffer channel that nothing reads: the first write never completes
    let (out_tx, mut out_rx) = futures::channel::mpsc::channel::<Message>(0);
    let (_in_tx, in_rx) = futures::channel::mpsc::unbounded::<Result<Message, WsError>>();
    let transport = Transport::new(out_tx.sink_map_err(|_| WsError::ConnectionClosed), in_rx);

    let client = fx
        .hub
        .add_client(transport, SocketAddr::new(ip(1), 50000), ip(1), None)
        .await
        .unwrap();

    for n in 0..40 {
        client.send_msg(&["pc".to_string(), n.to_string()]);
    }
    assert!(client.is_closed());
    eventually(|| fx.hub.client_count() == 0).await;

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        let mut drained = 0;
        while out_rx.next().await.is_some() {
            drained += 1;
        }
        drained
    })
    .await
    .expect("transport left open after teardown");
    assert!(drained <= 1);
}

#[tokio::test]
async fn broadcast_tick_reaches_every_client() {
    let fx = fixture();

    let mut peers = Vec::new();
    for n in 1..=6 {
        let (result, mut peer) = connect(&fx.hub, ip(n), None).await;
        result.unwrap();
        next_text(&mut peer).await;
        peers.push(peer);
    }

    // a seventh client whose writer never drains
    let (stalled, _outbound) = SessionClient::new(
        999,
        crate::connection::ClientProfile {
            uuid: "stalled".into(),
            ..Default::default()
        },
        ip(100),
        SocketAddr::new(ip(100), 50000),
        1,
    );
    let stalled = Arc::new(stalled);
    assert!(stalled.send_msg(&["filler"]));
    assert!(fx.hub.registry().insert(stalled.clone()));
    assert_eq!(fx.hub.client_count(), 7);

    fx.hub.broadcast_tick().await;

    for peer in &mut peers {
        assert_eq!(next_text(peer).await.unwrap(), format!("pc{F}7"));
    }
    assert!(stalled.is_closed());
    assert_eq!(*fx.handlers.party_updates.lock().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_admissions_for_one_player_admit_one() {
    let fx = fixture();
    fx.store.register_account(token(1), account("alice"));

    let mut tasks = Vec::new();
    for n in 0..16u8 {
        let hub = fx.hub.clone();
        tasks.push(tokio::spawn(async move {
            let (result, peer) = connect(&hub, ip(n), Some(&token(1))).await;
            (result.is_ok(), peer)
        }));
    }

    let mut admitted = 0;
    let mut peers = Vec::new();
    for task in tasks {
        let (ok, peer) = task.await.unwrap();
        if ok {
            admitted += 1;
        }
        peers.push(peer);
    }
    assert_eq!(admitted, 1);
    assert_eq!(fx.hub.client_count(), 1);
}
