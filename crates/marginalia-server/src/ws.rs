//! Realtime channel.
//!
//! One WebSocket per (client, page). Three client frame kinds ride it:
//! CRDT sync payloads (base64), awareness updates, and agent events for the
//! router. Server frames carry sync payloads and awareness snapshots;
//! stateless suggestion pushes are forwarded verbatim as JSON text.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use marginalia_agent::supervisor;
use marginalia_doc::{DocEvent, OpenDoc};
use marginalia_types::{AgentEvent, AwarenessUser, PageId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/:page_id", get(upgrade))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame {
    /// CRDT sync message, base64-encoded.
    Sync { data: String },
    /// This client's presence state.
    Awareness { user: AwarenessUser },
    /// Agent trigger for the event router.
    AgentEvent { data: AgentEvent },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerFrame {
    Sync { data: String },
    Awareness { states: Vec<AwarenessUser> },
}

#[derive(Deserialize)]
struct ConnectParams {
    token: String,
}

async fn upgrade(
    Path(page_id): Path<PageId>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.ctx.store.verify_token(&params.token).await {
        Ok(Some(_user_id)) => ws.on_upgrade(move |socket| session(state, page_id, socket)),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "token verification unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "token verification unavailable" })),
            )
                .into_response()
        }
    }
}

async fn session(state: Arc<AppState>, page_id: PageId, socket: WebSocket) {
    let open = match state.ctx.docs.open(page_id).await {
        Ok(open) => open,
        Err(e) => {
            tracing::warn!(page = %page_id.short(), error = %e, "document open failed");
            return;
        }
    };

    if state.client_joined(page_id) == 1 {
        supervisor::document_loaded(&state.ctx, page_id).await;
    }
    let conn_id = state.ctx.docs.next_conn_id();
    tracing::debug!(page = %page_id.short(), conn = conn_id, "client connected");

    run_session(&state, &open, conn_id, socket).await;

    open.awareness().remove_client(conn_id);
    open.broadcast_awareness();
    tracing::debug!(page = %page_id.short(), conn = conn_id, "client disconnected");

    if state.client_left(&page_id) == 0 {
        supervisor::document_unloaded(&state.ctx, &page_id);
        if let Err(e) = state.ctx.docs.close(&page_id).await {
            tracing::warn!(page = %page_id.short(), error = %e, "document close failed");
        }
    }
}

async fn run_session(state: &Arc<AppState>, open: &Arc<OpenDoc>, conn_id: u64, socket: WebSocket) {
    let mut events = open.subscribe();
    let mut sync_state = automerge::sync::State::new();
    let (mut sink, mut stream) = socket.split();

    // Kick off the handshake from our side.
    if drain_sync(open, &mut sync_state, &mut sink).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(state, open, conn_id, &mut sync_state, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(conn = conn_id, error = %e, "socket error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(DocEvent::Changed) => {
                        if drain_sync(open, &mut sync_state, &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Ok(DocEvent::Stateless(payload)) => {
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(DocEvent::Awareness(states)) => {
                        if send_frame(&mut sink, &ServerFrame::Awareness { states }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(conn = conn_id, skipped = n, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Apply one inbound frame. Malformed frames are dropped with a log line.
async fn handle_frame(
    state: &Arc<AppState>,
    open: &Arc<OpenDoc>,
    conn_id: u64,
    sync_state: &mut automerge::sync::State,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(conn = conn_id, error = %e, "unparseable frame dropped");
            return;
        }
    };

    match frame {
        ClientFrame::Sync { data } => {
            let bytes = match BASE64.decode(&data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(conn = conn_id, error = %e, "bad sync payload dropped");
                    return;
                }
            };
            if let Err(e) = open.receive_sync(sync_state, &bytes).await {
                tracing::debug!(conn = conn_id, error = %e, "sync message rejected");
            }
        }
        ClientFrame::Awareness { user } => {
            open.awareness().set_client(conn_id, user);
            open.broadcast_awareness();
        }
        ClientFrame::AgentEvent { data } => {
            state.events.dispatch(data).await;
        }
    }
}

/// Send every pending sync message for this peer.
async fn drain_sync(
    open: &Arc<OpenDoc>,
    sync_state: &mut automerge::sync::State,
    sink: &mut (impl SinkExt<Message> + Unpin),
) -> Result<(), ()> {
    loop {
        match open.generate_sync(sync_state).await {
            Ok(Some(bytes)) => {
                let frame = ServerFrame::Sync {
                    data: BASE64.encode(&bytes),
                };
                send_frame(sink, &frame).await?;
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "sync generation failed");
                return Err(());
            }
        }
    }
}

async fn send_frame(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
