//! Subscriber-facing surface: WebSocket stream plus a REST snapshot.
//!
//! `/stream` registers a hub subscriber and forwards each payload as one
//! JSON text frame until the client goes away. `/api/aircraft` serves the
//! current snapshot for one-shot polling clients.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use sbs_core::filter;
use sbs_core::payload::{AircraftView, ConnectionStatus, OutboundMessage};

use crate::publisher::{now, SharedStore, SubscriberHub};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub store: SharedStore,
    pub hub: Arc<SubscriberHub>,
    pub expiry_secs: f64,
    pub trusted_only: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream", axum::routing::get(ws_stream))
        .route("/api/aircraft", axum::routing::get(api_aircraft))
        .with_state(state)
        .layer(cors)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/aircraft — current snapshot, same ordering and trust policy as
/// the published payloads.
async fn api_aircraft(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = now();
    let views: Vec<AircraftView> = {
        let store = state.store.read().unwrap();
        let snap = if state.trusted_only {
            filter::trusted_snapshot(&store, timestamp, state.expiry_secs)
        } else {
            store.snapshot(timestamp, state.expiry_secs)
        };
        snap.iter()
            .map(|r| AircraftView::from_record(r, timestamp))
            .collect()
    };
    Json(views)
}

/// GET /stream — WebSocket subscription.
async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscriber_loop(socket, state))
}

/// Forward hub payloads to one WebSocket client. Dropping the receiver on
/// exit is what deregisters the subscriber — the hub prunes the closed
/// channel on its next broadcast.
async fn subscriber_loop(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.hub.register();

    let hello = OutboundMessage::Connection {
        status: ConnectionStatus::Connected,
        message: "subscribed to aircraft stream".into(),
    };
    match serde_json::to_string(&hello) {
        Ok(text) => {
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        Err(_) => return,
    }

    loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else { break };
                let Ok(text) = serde_json::to_string(payload.as_ref()) else {
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {} // inbound frames are ignored; this is a one-way feed
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
