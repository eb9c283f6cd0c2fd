//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. Long-running work (generation, batches) runs in
//! spawned tasks that push progress into the connection's outbound queue, so
//! the loop keeps reading (e.g. `cancel_batch`) while work is in flight.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, error, instrument, debug};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::logic::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "b2first_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "b2first_backend", "WebSocket connected");
  let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerWsMessage>();

  loop {
    tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => {
          match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(msg) => {
              debug!(target: "b2first_backend", "WS received: {:?}", &msg);
              handle_client_ws(msg, &state, &out_tx).await;
            }
            Err(e) => {
              let _ = out_tx.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) });
            }
          }
        }
        Some(Ok(Message::Ping(payload))) => { let _ = socket.send(Message::Pong(payload)).await; }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          error!(target: "b2first_backend", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => {}
      },
      Some(reply) = out_rx.recv() => {
        let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "b2first_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "b2first_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state, out))]
async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, out: &UnboundedSender<ServerWsMessage>) {
  match msg {
    ClientWsMessage::Ping => {
      let _ = out.send(ServerWsMessage::Pong);
    }

    ClientWsMessage::GenerateTask { request, save } => {
      if request.topic.trim().is_empty() {
        let _ = out.send(ServerWsMessage::Error { message: "topic must not be empty".into() });
        return;
      }
      let state = state.clone();
      let out = out.clone();
      tokio::spawn(async move {
        let observer = stage_observer(out.clone());
        let reply = match generate_task(&state, &request, save, observer.as_ref()).await {
          Ok(result) => {
            info!(target: "generator", task_id = %result.task.id, "WS task generated");
            ServerWsMessage::TaskGenerated { result }
          }
          Err((_, failure)) => ServerWsMessage::GenerationFailed { failure },
        };
        let _ = out.send(reply);
      });
    }

    ClientWsMessage::StartBatch { request } => {
      let events = forward_batch_events(out.clone());
      if let Err(e) = start_batch(state, request, Some(events)).await {
        let _ = out.send(ServerWsMessage::Error { message: e.to_string() });
      }
    }

    ClientWsMessage::CancelBatch => {
      let reply = if cancel_batch(state).await {
        ServerWsMessage::BatchCancelling
      } else {
        ServerWsMessage::Error { message: "No batch is running.".into() }
      };
      let _ = out.send(reply);
    }
  }
}
