//! WebSocket handler: one [`RelaySession`] per socket.
//!
//! Client → server: binary `name_len(1) + channel + image blob`.
//! Server → client: JSON text, one event per accepted submission.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::session::RelaySession;
use crate::web::AppState;

/// Handle a single WebSocket connection.
pub async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let id = state.next_session_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (mut session, mut events) =
        RelaySession::connect(id, Arc::clone(&state.use_case), state.limits);
    log::info!("User {id} connected");

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Session {id}: failed to encode {} event: {e}", event.channel());
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => session.submit(&data),
                    Some(Ok(Message::Text(_))) => {
                        session.reject("text messages are not accepted; send a binary submission");
                    }
                    // tungstenite queues the pong reply itself.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::debug!("Session {id}: socket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    session.disconnect();
    log::info!("User {id} disconnected");
}
