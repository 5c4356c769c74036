//! HTTP/WebSocket front end.
//!
//! `GET /ws` upgrades to the duplex session protocol, one JSON message per
//! text frame. `GET /healthz` and `GET /sessions` are plain JSON endpoints.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::session::{DiagnosticSession, SessionIo, SessionPeer, SessionServices, SessionSummary};

/// Frames buffered per direction before the slower side applies backpressure.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
struct GatewayState {
    services: Arc<SessionServices>,
}

pub fn router(services: Arc<SessionServices>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/sessions", get(sessions_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { services })
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, services: Arc<SessionServices>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }
    axum::serve(listener, router(services).into_make_service()).await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn sessions_handler(State(state): State<GatewayState>) -> Json<Vec<SessionSummary>> {
    Json(state.services.registry.snapshot())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| bridge(socket, state.services))
        .into_response()
}

/// Pump frames between the socket and a session. The session is dropped as
/// soon as the client goes away.
async fn bridge(socket: WebSocket, services: Arc<SessionServices>) {
    let (mut sink, mut stream) = socket.split();
    let (io, peer) = SessionIo::pair(CHANNEL_CAPACITY);
    let SessionPeer {
        inbound,
        mut outbound,
    } = peer;

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("dropping unserializable event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = async move {
        while let Some(Ok(message)) = stream.next().await {
            let frame = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if inbound.send(frame).await.is_err() {
                break;
            }
        }
    };

    let session = DiagnosticSession::new(services);
    tokio::select! {
        status = session.run(io) => debug!(?status, "session finished"),
        _ = reader => info!("client disconnected"),
    }
    let _ = writer.await;
}
