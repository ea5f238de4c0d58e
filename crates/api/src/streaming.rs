//! WebSocket endpoint.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info};

use crate::session::Session;
use crate::state::AppState;

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    /// Bearer token issued by the marketplace application.
    pub token: Option<String>,
}

/// Upgrade to a relay socket.
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

async fn handle_socket(socket: WebSocket, query: SocketQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut room_rx) = Session::open(state, query.token.as_deref()).await;

    let connection_id = session.context().connection_id.clone();
    info!(
        connection_id = %connection_id,
        user_id = ?session.context().user_id(),
        "Socket connected"
    );

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = session.handle_text(text.as_str()).await
                            && sender.send(Message::Text(reply.to_json().into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            Some(event) = room_rx.recv() => {
                let event = session.room_event(event);
                if sender.send(Message::Text(event.to_json().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    session.close().await;
    info!(connection_id = %connection_id, "Socket closed");
}
