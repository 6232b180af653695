//! End-to-end tests: real server on an ephemeral port, real WebSocket clients.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use collabhub_gateway::{app_state::AppState, config, router};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_test_server() -> (std::net::SocketAddr, AppState) {
    start_server_with("version: 1\n").await
}

async fn start_server_with(yaml: &str) -> (std::net::SocketAddr, AppState) {
    let cfg = config::load_from_str(yaml).unwrap();
    let state = AppState::new(cfg);
    let app = router::build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: std::net::SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

/// Registration happens after the handshake response, so poll for it.
async fn wait_for_connections(state: &AppState, n: usize) {
    let registry = state.registry();
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} connections, have {}", registry.len()));
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(s) => return s,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Count text frames until `n` arrived or the stream ends.
async fn count_texts(mut rx: SplitStream<Client>, n: usize) -> usize {
    let mut got = 0;
    while got < n {
        match rx.next().await {
            Some(Ok(Message::Text(_))) => got += 1,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            _ => break,
        }
    }
    got
}

/// Read until the server ends the stream: a close frame, EOF or a reset.
async fn wait_for_end(ws: &mut Client) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match ws.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("server never ended the stream");
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut buf = String::new();
    stream.read_to_string(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn two_clients_then_one_leaves() {
    let (addr, state) = start_test_server().await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for_connections(&state, 2).await;

    let first = r#"{"session_id":"s1","user_id":"u1","content":"hello"}"#;
    a.send(Message::Text(first.into())).await.unwrap();

    // delivery is global: the sender gets its own message too
    assert_eq!(next_text(&mut a).await, first);
    assert_eq!(next_text(&mut b).await, first);

    b.close(None).await.unwrap();
    wait_for_connections(&state, 1).await;

    let second = r#"{"session_id":"s1","user_id":"u1","content":"still here"}"#;
    a.send(Message::Text(second.into())).await.unwrap();
    assert_eq!(next_text(&mut a).await, second);
    assert_eq!(state.registry().len(), 1);
}

#[tokio::test]
async fn binary_json_frames_are_relayed_as_text() {
    let (addr, state) = start_test_server().await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for_connections(&state, 2).await;

    let raw = r#"{"session_id":"s9","user_id":"u9","content":"fn main() {}"}"#;
    b.send(Message::Binary(raw.as_bytes().to_vec())).await.unwrap();

    assert_eq!(next_text(&mut a).await, raw);
    assert_eq!(next_text(&mut b).await, raw);
}

#[tokio::test]
async fn malformed_payload_only_drops_the_sender() {
    let (addr, state) = start_test_server().await;

    let mut good = connect(addr).await;
    let mut bad = connect(addr).await;
    wait_for_connections(&state, 2).await;

    bad.send(Message::Text("not json".into())).await.unwrap();
    wait_for_connections(&state, 1).await;
    assert_eq!(state.metrics().decode_errors.get(&[]), 1);

    // the bad client sees a transport-level close, never an error payload
    let frame = tokio::time::timeout(Duration::from_secs(2), bad.next()).await.unwrap();
    assert!(matches!(frame, None | Some(Ok(Message::Close(_))) | Some(Err(_))));

    let raw = r#"{"session_id":"s1","user_id":"u2","content":"ok"}"#;
    good.send(Message::Text(raw.into())).await.unwrap();
    assert_eq!(next_text(&mut good).await, raw);
}

#[tokio::test]
async fn independent_hubs_do_not_share_connections() {
    let (addr1, state1) = start_test_server().await;
    let (addr2, state2) = start_test_server().await;

    let mut a = connect(addr1).await;
    let mut b = connect(addr2).await;
    wait_for_connections(&state1, 1).await;
    wait_for_connections(&state2, 1).await;

    let raw = r#"{"session_id":"s","user_id":"u","content":"hub one"}"#;
    a.send(Message::Text(raw.into())).await.unwrap();
    assert_eq!(next_text(&mut a).await, raw);

    let nothing = tokio::time::timeout(Duration::from_millis(200), b.next()).await;
    assert!(nothing.is_err(), "hub two must not see hub one's traffic");
}

#[tokio::test]
async fn plain_get_on_ws_path_is_rejected_and_counted() {
    let (addr, state) = start_test_server().await;

    let resp = http_get(addr, "/ws").await;
    assert!(resp.starts_with("HTTP/1.1 4"), "{resp}");
    assert!(state.registry().is_empty());
    assert_eq!(state.metrics().ws_upgrades.get(&[("result", "failed")]), 1);
}

#[tokio::test]
async fn ops_endpoints() {
    let (addr, state) = start_test_server().await;

    let health = http_get(addr, "/healthz").await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");
    assert!(health.ends_with("ok"));

    let ready = http_get(addr, "/readyz").await;
    assert!(ready.ends_with("ready"), "{ready}");

    let _a = connect(addr).await;
    wait_for_connections(&state, 1).await;
    let metrics = http_get(addr, "/metrics").await;
    assert!(metrics.contains("collabhub_connections_active 1"), "{metrics}");
    assert!(metrics.contains("collabhub_ws_upgrades_total{result=\"ok\"} 1"), "{metrics}");

    state.metrics().set_draining();
    let draining = http_get(addr, "/readyz").await;
    assert!(draining.starts_with("HTTP/1.1 503"), "{draining}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_reaches_every_reader_that_keeps_up() {
    const FRAMES: usize = 3000;
    let (addr, state) = start_test_server().await;

    let (mut a_tx, a_rx) = connect(addr).await.split();
    let (_b_tx, b_rx) = connect(addr).await.split();
    wait_for_connections(&state, 2).await;

    let a_reader = tokio::spawn(count_texts(a_rx, FRAMES));
    let b_reader = tokio::spawn(count_texts(b_rx, FRAMES));

    for i in 0..FRAMES {
        let raw = format!(r#"{{"session_id":"s","user_id":"a","content":"{i}"}}"#);
        a_tx.send(Message::Text(raw)).await.unwrap();
    }

    let a_got = tokio::time::timeout(Duration::from_secs(30), a_reader).await.unwrap().unwrap();
    let b_got = tokio::time::timeout(Duration::from_secs(30), b_reader).await.unwrap().unwrap();
    assert_eq!(a_got, FRAMES);
    assert_eq!(b_got, FRAMES);

    assert_eq!(state.registry().len(), 2);
    let m = state.metrics();
    assert_eq!(m.connections_pruned.get(&[("reason", "stalled")]), 0);
    assert_eq!(m.writer_timeouts.get(&[]), 0);
    assert_eq!(m.deliveries.get(&[("outcome", "ok")]), (2 * FRAMES) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_that_stops_reading_is_dropped_and_others_keep_receiving() {
    const FRAMES: usize = 400;
    let yaml = "version: 1\ngateway:\n  outbound_queue: 2\n  write_timeout_ms: 250\n";
    let (addr, state) = start_server_with(yaml).await;

    let (mut s_tx, s_rx) = connect(addr).await.split();
    let (_h_tx, h_rx) = connect(addr).await.split();
    // never reads until the assertions below
    let mut stuck = connect(addr).await;
    wait_for_connections(&state, 3).await;

    let s_reader = tokio::spawn(count_texts(s_rx, FRAMES));
    let h_reader = tokio::spawn(count_texts(h_rx, FRAMES));

    // large frames fill the stuck client's socket buffers quickly
    let content = "x".repeat(64 * 1024);
    for _ in 0..FRAMES {
        let raw = format!(r#"{{"session_id":"s","user_id":"sender","content":"{content}"}}"#);
        s_tx.send(Message::Text(raw)).await.unwrap();
    }

    let h_got = tokio::time::timeout(Duration::from_secs(60), h_reader).await.unwrap().unwrap();
    let s_got = tokio::time::timeout(Duration::from_secs(60), s_reader).await.unwrap().unwrap();
    assert_eq!(h_got, FRAMES);
    assert_eq!(s_got, FRAMES);

    wait_for_connections(&state, 2).await;
    let m = state.metrics();
    let timeouts = m.writer_timeouts.get(&[]);
    let stalled = m.connections_pruned.get(&[("reason", "stalled")]);
    assert!(timeouts + stalled >= 1, "timeouts={timeouts} stalled={stalled}");

    wait_for_end(&mut stuck).await;
}

#[tokio::test]
async fn close_all_ends_every_session() {
    let (addr, state) = start_test_server().await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    wait_for_connections(&state, 2).await;

    assert_eq!(state.close_all(), 2);
    wait_for_end(&mut a).await;
    wait_for_end(&mut b).await;

    assert!(state.wait_drained(Duration::from_secs(5)).await);
    let ready = http_get(addr, "/readyz").await;
    assert!(ready.starts_with("HTTP/1.1 503"), "{ready}");
}
