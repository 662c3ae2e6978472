//! Tunehall // API // WebSocket
//!
//! The overlay protocol: `overlay_register` → `overlay_registered`, then a
//! `playlist_update` push per structural change and per ticker second,
//! `overlay_ping` to refresh the subscriber's TTL.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::app::App;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    OverlayRegister {
        user_id: String,
        guild_id: String,
        #[serde(default)]
        meta: serde_json::Value,
    },
    OverlayPing,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    OverlayRegistered { subscriber_id: Uuid },
    Error { message: String },
}

pub async fn upgrade(ws: WebSocketUpgrade, State(app): State<App>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(mut socket: WebSocket, app: App) {
    let mut subscriber_id: Option<Uuid> = None;
    let mut room_rx: Option<tokio::sync::broadcast::Receiver<String>> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::OverlayRegister { user_id, guild_id, meta }) => {
                                let id = app.presence.register(user_id, guild_id.clone(), meta);
                                subscriber_id = Some(id);
                                room_rx = Some(app.sink.subscribe(&guild_id));
                                let ack = ServerMessage::OverlayRegistered { subscriber_id: id };
                                if send_json(&mut socket, &ack).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::OverlayPing) => {
                                if let Some(id) = subscriber_id {
                                    app.presence.heartbeat(id);
                                }
                            }
                            Err(e) => {
                                let err = ServerMessage::Error { message: e.to_string() };
                                if send_json(&mut socket, &err).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            broadcast = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => std::future::pending().await,
                }
            } => {
                let Some(payload) = broadcast else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(id) = subscriber_id {
        app.presence.remove(id);
        debug!(subscriber_id = %id, "overlay subscriber disconnected");
    }
}

async fn send_json(socket: &mut WebSocket, value: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_else(|_| json!({"type": "error"}).to_string());
    socket.send(Message::Text(text)).await
}
