// WebSocket handler for interactive segmentation sessions

use crate::http::ApiState;
use crate::websocket_manager::{ConnectionId, Registration, WebSocketManager};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::USER_AGENT, HeaderMap},
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tessera_api::{session, ServerMessage};
use tessera_engine::{EventSink, SegmentationEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Forwards orchestrator progress events to one session.
pub struct ConnectionSink {
    manager: Arc<WebSocketManager>,
    registration: Registration,
}

impl ConnectionSink {
    pub fn new(manager: Arc<WebSocketManager>, registration: Registration) -> Self {
        Self {
            manager,
            registration,
        }
    }
}

#[async_trait]
impl EventSink for ConnectionSink {
    async fn emit(&self, event: SegmentationEvent) {
        self.manager.send(&self.registration, ServerMessage::from(event));
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// `GET /ws`: a fresh connection id is assigned.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Response {
    let connection_id = Uuid::new_v4().to_string();
    let agent = user_agent(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id, agent))
}

/// `GET /ws/:connection_id`: the client picks its id.
pub async fn websocket_with_id_handler(
    ws: WebSocketUpgrade,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Response {
    let agent = user_agent(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id, agent))
}

async fn handle_socket(
    socket: WebSocket,
    state: ApiState,
    connection_id: ConnectionId,
    user_agent: Option<String>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let registration = match state
        .ws_manager
        .register_connection(connection_id.clone(), user_agent, tx)
    {
        Ok(registration) => registration,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Failed to register WebSocket connection");
            return;
        }
    };
    info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let send_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "Failed to serialize WebSocket message");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json)).await {
                warn!(connection_id = %send_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    state
        .ws_manager
        .send(&registration, ServerMessage::connection_established(&connection_id));

    let recv_id = connection_id.clone();
    let recv_registration = registration.clone();
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        let sink = ConnectionSink::new(Arc::clone(&recv_state.ws_manager), recv_registration.clone());
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    recv_state.ws_manager.update_activity(&recv_id);
                    let reply = session::handle_text(&recv_state.orchestrator, &text, &sink).await;
                    if !recv_state.ws_manager.send(&recv_registration, reply) {
                        break;
                    }
                }
                Ok(Message::Binary(_)) => {
                    warn!(connection_id = %recv_id, "Received binary message, ignoring");
                }
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %recv_id, "WebSocket connection closed by client");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    warn!(connection_id = %recv_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    match state.ws_manager.unregister_connection(&registration) {
        Some(info) => info!(
            connection_id = %connection_id,
            connected_secs = (Utc::now() - info.connected_at).num_seconds(),
            active = state.ws_manager.connection_count(),
            "WebSocket connection closed"
        ),
        None => debug!(connection_id = %connection_id, "WebSocket session ended after being replaced"),
    }
}
