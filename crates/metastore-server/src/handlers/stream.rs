//! `GET /stream/records` — SSE and WebSocket fan-out (`spec.md` §4.E, §6).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use metastore_core::events::sse::{connect_frames, heartbeat_frame, HEARTBEAT_INTERVAL};
use metastore_core::events::{SseDispatcher, StreamHub, Transport, WsEnvelope};
use metastore_core::models::token::{Identity, Scope};

use crate::auth::AuthContext;
use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct StreamQuery {
    #[serde(default)]
    pub transport: Option<String>,
}

const FRAME_CHANNEL_CAPACITY: usize = 64;

pub async fn stream(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<StreamQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    auth.require_scope(Scope::Read)?;

    let wants_ws = matches!(query.transport.as_deref(), Some("ws") | Some("websocket"));

    if let (true, Some(upgrade)) = (wants_ws, ws) {
        let hub = state.stream_hub.clone();
        let identity = auth.0;
        return Ok(upgrade.on_upgrade(move |socket| run_websocket(socket, hub, identity)));
    }

    Ok(run_sse(state).await)
}

/// The SSE dispatcher already renders fully-framed `text/event-stream`
/// strings (retry hint, drop-accounting comments included); this handler
/// only adds the periodic heartbeat and forwards frames as-is rather than
/// re-wrapping each one into `axum::response::sse::Event`.
async fn run_sse(state: AppState) -> Response {
    let subscription = state.stream_hub.subscribe(Transport::Sse);
    let mut dispatcher = SseDispatcher::new(subscription);
    let (tx, rx) = mpsc::channel::<Result<String, std::convert::Infallible>>(FRAME_CHANNEL_CAPACITY);

    let _ = tx.send(Ok(connect_frames())).await;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = dispatcher.next_frame() => {
                    match frame {
                        Some(frame) => {
                            if tx.send(Ok(frame)).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    if tx.send(Ok(heartbeat_frame().to_string())).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let body = axum::body::Body::from_stream(ReceiverStream::new(rx));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn run_websocket(mut socket: WebSocket, hub: std::sync::Arc<StreamHub>, _identity: Identity) {
    let ack = WsEnvelope::connection_ack();
    if let Ok(text) = serde_json::to_string(&ack) {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    let mut subscription = hub.subscribe(Transport::WebSocket);
    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        let envelope = WsEnvelope::for_event(&event);
                        let Ok(text) = serde_json::to_string(&envelope) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        }
    }
}
