//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS (no query parameters, no socket auth)
//! - Register the connection, run a reader and a writer task per socket
//! - Decode-once every inbound frame and hand chat messages to the broadcaster
//! - Drain the connection's outbound queue into the socket with a bounded write
//! - Deregister on close, read error, write error/timeout, malformed payload,
//!   or when the server closes the connection (pruned or shutting down)
//!
//! No error payload is ever written back to the client: failures end the
//! connection at the transport level and are logged here.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::Instrument;

use collabhub_core::error::CollabError;

use crate::app_state::AppState;
use crate::obs::HubMetrics;
use crate::realtime::{Connection, PreparedMsg};
use crate::transport::codec::{decode, Inbound};

type WsSink = SplitSink<WebSocket, Message>;

/// Why a session ended. Logged once on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    ClientGone,
    ReadError,
    MalformedPayload,
    WriteError,
    WriteTimeout,
    ServerClosed,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::ClientGone => "client_gone",
            CloseReason::ReadError => "read_error",
            CloseReason::MalformedPayload => "malformed_payload",
            CloseReason::WriteError => "write_error",
            CloseReason::WriteTimeout => "write_timeout",
            CloseReason::ServerClosed => "server_closed",
        }
    }
}

fn log_transport(err: &CollabError) {
    tracing::warn!(code = err.code().as_str(), error = %err, "transport failure");
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let metrics = app.metrics();

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            metrics.ws_upgrades.inc(&[("result", "failed")]);
            log_transport(&CollabError::Transport(format!("websocket upgrade rejected: {rejection}")));
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(move |e| {
        metrics.ws_upgrades.inc(&[("result", "failed")]);
        log_transport(&CollabError::Transport(format!("websocket upgrade failed: {e}")));
    })
    .on_upgrade(move |socket| run_session(app, socket))
}

// --------------------
// Session
// --------------------
async fn run_session(app: AppState, socket: WebSocket) {
    let registry = app.registry();

    let gw = &app.cfg().gateway;
    let (out_tx, out_rx) = mpsc::channel::<PreparedMsg>(gw.outbound_queue);
    let conn = Connection::new(registry.next_id(), out_tx);

    let span = tracing::info_span!("ws_conn", conn_id = %conn.id());
    session_loop(app, conn, out_rx, socket).instrument(span).await;
}

async fn session_loop(
    app: AppState,
    conn: Connection,
    out_rx: mpsc::Receiver<PreparedMsg>,
    socket: WebSocket,
) {
    let registry = app.registry();
    let broadcaster = app.broadcaster();
    let metrics = app.metrics();
    let write_timeout = Duration::from_millis(app.cfg().gateway.write_timeout_ms);

    // Connecting -> Open
    metrics.ws_upgrades.inc(&[("result", "ok")]);
    registry.register(conn.clone());
    tracing::info!(active = registry.len(), "connection open");

    let (ws_tx, mut ws_rx) = socket.split();

    // The writer owns the sink, so a reader blocked in a broadcast never stops
    // its own queue from draining.
    let writer = tokio::spawn(
        write_loop(conn.clone(), out_rx, ws_tx, write_timeout, app.metrics()).in_current_span(),
    );

    let read_reason = loop {
        tokio::select! {
            biased;

            // closed by the writer, the broadcaster or shutdown
            _ = conn.closed() => break CloseReason::ServerClosed,

            incoming = ws_rx.next() => {
                let msg = match incoming {
                    None => break CloseReason::ClientGone,
                    Some(Err(e)) => {
                        log_transport(&CollabError::Transport(format!("socket read failed: {e}")));
                        break CloseReason::ReadError;
                    }
                    Some(Ok(msg)) => msg,
                };

                match decode(msg) {
                    Ok(Inbound::Chat { msg, bytes_len }) => {
                        metrics.messages_received.inc(&[]);
                        tracing::debug!(
                            bytes_len,
                            session_id = %msg.session_id,
                            user_id = %msg.user_id,
                            "message received"
                        );
                        if let Err(e) = broadcaster.broadcast(&msg).await {
                            tracing::warn!(code = e.code().as_str(), error = %e, "broadcast failed");
                        }
                    }
                    // the ws library answers pings itself
                    Ok(Inbound::Ping) | Ok(Inbound::Pong) => {}
                    Ok(Inbound::Close) => break CloseReason::ClientClosed,
                    Err(e) => {
                        metrics.decode_errors.inc(&[]);
                        tracing::warn!(code = e.code().as_str(), error = %e, "dropping connection");
                        break CloseReason::MalformedPayload;
                    }
                }
            }
        }
    };

    // Closing -> Closed
    registry.deregister(conn.id());
    conn.close();

    let write_failure = match writer.await {
        Ok(failure) => failure,
        Err(e) => {
            tracing::error!(error = %e, "writer task failed");
            None
        }
    };
    // a writer failure is what closed the connection, so it wins
    let reason = match (read_reason, write_failure) {
        (CloseReason::ServerClosed, Some(w)) => w,
        (r, _) => r,
    };

    tracing::info!(reason = reason.as_str(), active = registry.len(), "connection closed");
}

/// Drain the outbound queue into the socket until the connection closes or a
/// write fails. Returns the failure, if any.
async fn write_loop(
    conn: Connection,
    mut out_rx: mpsc::Receiver<PreparedMsg>,
    mut ws_tx: WsSink,
    write_timeout: Duration,
    metrics: Arc<HubMetrics>,
) -> Option<CloseReason> {
    let failure = loop {
        tokio::select! {
            biased;

            // never write after close
            _ = conn.closed() => break None,

            maybe_out = out_rx.recv() => {
                // The sender lives inside `conn`, so the queue cannot close under us.
                let Some(out) = maybe_out else { break None };
                match timeout(write_timeout, ws_tx.send(out.to_ws_message())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log_transport(&CollabError::Transport(format!("socket write failed: {e}")));
                        break Some(CloseReason::WriteError);
                    }
                    Err(_) => {
                        metrics.writer_timeouts.inc(&[]);
                        log_transport(&CollabError::Transport(format!(
                            "socket write timed out after {}ms",
                            write_timeout.as_millis()
                        )));
                        break Some(CloseReason::WriteTimeout);
                    }
                }
            }
        }
    };

    conn.close();
    drop(out_rx);

    if failure.is_none() {
        // best effort: the peer may already be gone
        let _ = timeout(write_timeout, ws_tx.send(Message::Close(None))).await;
    }
    failure
}
