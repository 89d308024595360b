//! Real-time endpoint. The origin is checked before the upgrade completes;
//! after that the server only reads to notice the peer leaving and writes
//! domain events queued by the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::hub::{BroadcastHub, ChannelSink};
use super::AppState;
use crate::error::{AppError, RealtimeError};

/// Exact match against the one configured origin. A request without an
/// `Origin` header is rejected too.
pub fn check_origin(headers: &HeaderMap, allowed: &str) -> Result<(), RealtimeError> {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    match origin {
        Some(o) if o == allowed => Ok(()),
        other => Err(RealtimeError::OriginRejected(other.map(str::to_string))),
    }
}

pub async fn ws_handler(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if let Err(err) = check_origin(&headers, &state.config.allowed_origin) {
        warn!(target: "realtime", "upgrade refused: {err}");
        return AppError::forbidden("origin_rejected", "origin not allowed").into_response();
    }
    let hub = Arc::clone(&state.hub);
    let capacity = state.config.ws_queue_capacity;
    let write_timeout = state.config.ws_write_timeout;
    ws.on_upgrade(move |socket| serve_connection(hub, socket, capacity, write_timeout))
}

/// Drive one open connection until the peer goes away or a write fails.
/// A write that stalls past `write_timeout` counts as failed. The registry
/// entry exists exactly as long as this future runs.
pub async fn serve_connection(hub: Arc<BroadcastHub>, socket: WebSocket, capacity: usize, write_timeout: Duration) {
    let (mut outbound, mut inbound) = socket.split();
    let (sink, mut queue) = ChannelSink::bounded(capacity);
    let id = hub.registry().register(Arc::new(sink));
    info!(target: "realtime", conn = %id, open = hub.registry().len(), "connection opened");

    let writer_hub = Arc::clone(&hub);
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            let failure = match tokio::time::timeout(write_timeout, outbound.send(Message::Text(frame.to_string().into()))).await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => RealtimeError::ConnectionWriteFailed(e.to_string()),
                Err(_) => RealtimeError::ConnectionWriteFailed(format!("write stalled for {write_timeout:?}")),
            };
            debug!(target: "realtime", conn = %id, "{failure}");
            writer_hub.registry().remove(id);
            break;
        }
    });

    loop {
        tokio::select! {
            msg = inbound.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(target: "realtime", conn = %id, "read failed: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    hub.registry().remove(id);
    writer.abort();
    info!(target: "realtime", conn = %id, open = hub.registry().len(), "connection closed");
}
