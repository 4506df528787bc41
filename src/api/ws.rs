//! Duplex channel: JSON frames over a WebSocket.
//!
//! Client frames: `{"type":"register","processId"}` tags the connection,
//! `{"type":"input","processId","data"}` feeds a line to that session's stdin.
//! Server frames: `output`, `error` and `completed`, each `{"type","data"}`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::session::{ClientHandle, ClientMessage, SessionRegistry};

use super::AppState;

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let registry = state.supervisor.registry().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(socket: WebSocket, registry: SessionRegistry) {
    let (client, mut events) = registry.connect();
    info!(client = client.id(), "websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                debug!("websocket send failed, client gone");
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "websocket error");
                break;
            }
        };
        handle_client_message(&registry, &client, &text);
    }

    info!(client = client.id(), "websocket client disconnected");
    drop(client);
    send_task.abort();
}

fn handle_client_message(registry: &SessionRegistry, client: &ClientHandle, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(client = client.id(), error = %e, "websocket message error");
            return;
        }
    };

    match message {
        ClientMessage::Register { process_id } => {
            info!(client = client.id(), session = %process_id, "client registered");
            client.register(process_id);
        }
        ClientMessage::Input { process_id, data } => {
            if registry.send_input(&process_id, &data) {
                debug!(session = %process_id, bytes = data.len(), "input queued for process");
            } else {
                debug!(session = %process_id, "input dropped, no live process");
            }
        }
    }
}
