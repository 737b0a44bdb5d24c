//! WebSocket endpoint and per-connection lifecycle.
//!
//! A connection moves through three states. While *connecting*, the bearer
//! token has been checked by middleware and the upgrade is in progress. Once
//! *active*, it is registered with the [`Hub`], a writer task drains its
//! outbound queue into the socket, and the read loop relays client frames.
//! On *close* it is deregistered first and only then is the writer stopped
//! and the socket released.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use stockroom_types::InboundFrame;
use tokio::sync::mpsc;

use crate::hub::{Hub, SubscriberId};
use crate::AppState;

/// `GET /ws`: upgrades to the live-update feed.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(remote_addr = %addr, "websocket upgrade failed: {}", e);
    })
    .on_upgrade(move |socket| handle_socket(socket, hub, addr))
}

/// Why a connection left the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    ReadError,
    WriterExited,
    HubShutdown,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client closed",
            Self::ReadError => "read error",
            Self::WriterExited => "writer exited",
            Self::HubShutdown => "hub shutdown",
        }
    }
}

async fn handle_socket(socket: WebSocket, hub: Hub, remote_addr: SocketAddr) {
    let (sink, mut stream) = socket.split();
    let (queue, outbound) = hub.outbound_queue();
    let mut shutdown = hub.shutdown_signal();

    let id = match hub.register(queue).await {
        Ok(id) => id,
        Err(e) => {
            tracing::info!(remote_addr = %remote_addr, "refusing websocket: {}", e);
            return;
        }
    };
    tracing::info!(subscriber = %id, remote_addr = %remote_addr, "subscriber connected");

    let write_timeout = hub.settings().write_timeout;
    let mut writer = tokio::spawn(write_loop(sink, outbound, write_timeout, id));
    let mut writer_done = false;

    let reason = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => relay_text(&hub, id, text.as_str()).await,
                Some(Ok(Message::Binary(bytes))) => {
                    tracing::debug!(subscriber = %id, len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %id, "websocket read failed: {}", e);
                    break CloseReason::ReadError;
                }
            },
            _ = &mut writer => {
                writer_done = true;
                break CloseReason::WriterExited;
            }
            _ = shutdown.changed() => break CloseReason::HubShutdown,
        }
    };

    // Registry removal must precede socket release.
    hub.deregister(id).await;

    if !writer_done {
        // The queue is closed now; give the writer one write window to flush
        // and send its Close frame.
        if tokio::time::timeout(write_timeout, &mut writer).await.is_err() {
            tracing::debug!(subscriber = %id, "writer did not finish, aborting");
            writer.abort();
        }
    }

    tracing::info!(
        subscriber = %id,
        remote_addr = %remote_addr,
        reason = reason.as_str(),
        "subscriber disconnected"
    );
}

async fn relay_text(hub: &Hub, id: SubscriberId, text: &str) {
    match InboundFrame::decode(text) {
        Ok(frame) => {
            hub.relay(id, frame).await;
        }
        Err(e) => {
            tracing::warn!(subscriber = %id, "discarding undecodable frame: {}", e);
        }
    }
}

/// Drains the outbound queue into the socket until the queue closes or a
/// write fails or exceeds `write_timeout`.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    write_timeout: Duration,
    id: SubscriberId,
) {
    while let Some(text) = outbound.recv().await {
        match tokio::time::timeout(write_timeout, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(subscriber = %id, "websocket write failed: {}", e);
                return;
            }
            Err(_) => {
                tracing::warn!(subscriber = %id, "websocket write timed out");
                return;
            }
        }
    }

    // Queue closed: the subscriber was deregistered.
    if let Ok(Err(e)) = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await {
        tracing::debug!(subscriber = %id, "failed to send close frame: {}", e);
    }
}
