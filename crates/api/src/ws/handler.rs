use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use shellgate_core::execution::OutputLine;
use shellgate_core::types::SessionId;

use crate::state::AppState;
use crate::ws::hub::{ConnectionHub, HubEvent};

/// JSON text frame sent to the listener.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum Frame<'a> {
    Script(&'a str),
    Output(&'a OutputLine),
    Error(&'a str),
}

impl Frame<'_> {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode websocket frame");
                None
            }
        }
    }
}

/// HTTP handler that upgrades the connection and attaches it to a session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<SessionId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state.hub))
}

/// Manage a single listener connection after upgrade.
///
/// Attaches to the session, then:
///   1. Spawns a sender task that forwards hub events as JSON frames and
///      closes the socket when the invocation completes.
///   2. Spawns a receiver task that waits for the client to go away.
///   3. Whichever finishes first stops the other.
async fn handle_socket(socket: WebSocket, session_id: SessionId, hub: Arc<ConnectionHub>) {
    let (mut sink, mut stream) = socket.split();

    let mut attachment = match hub.attach(session_id).await {
        Ok(attachment) => attachment,
        Err(e) => {
            tracing::debug!(%session_id, error = %e, "WebSocket attach rejected");
            if let Some(msg) = Frame::Error(&e.to_string()).to_message() {
                let _ = sink.send(msg).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::info!(%session_id, "WebSocket attached");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = attachment.recv().await {
            if !forward(&mut sink, &event).await {
                tracing::debug!(%session_id, "WebSocket sink closed");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%session_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(%session_id, "WebSocket disconnected");
}

async fn forward(sink: &mut SplitSink<WebSocket, Message>, event: &HubEvent) -> bool {
    let frame = match event {
        HubEvent::Script(command) => Frame::Script(command),
        HubEvent::Output(line) => Frame::Output(line),
    };
    match frame.to_message() {
        Some(msg) => sink.send(msg).await.is_ok(),
        None => true,
    }
}
