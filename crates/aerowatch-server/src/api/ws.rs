//! WebSocket streaming for real-time updates.
//!
//! Every client receives the full downlink (status, alerts, acks). Text
//! frames sent by the client are queued as commands.
use crate::state::AppState;
use aerowatch_core::{CommandAck, Downlink};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde_json::Value;
use std::sync::Arc;

/// Handler for WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = submit_frame(&state, &text) {
                            if socket.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(msg) => {
                        let Ok(payload) = serde_json::to_string(&msg) else {
                            continue;
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Stream client lagged, dropped {} messages", skipped);
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

/// Queue an inbound frame; returns an immediate rejection for unusable frames.
fn submit_frame(state: &AppState, text: &str) -> Option<String> {
    let reject = |reason: &str| {
        serde_json::to_string(&Downlink::Ack(CommandAck::rejected("unknown", reason))).ok()
    };

    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => {
            if state.submit_command(value) {
                None
            } else {
                reject("control loop is shutting down")
            }
        }
        _ => reject("frame is not a JSON object"),
    }
}
