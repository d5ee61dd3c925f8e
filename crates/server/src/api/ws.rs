//! WebSocket feeds of job events.
//!
//! `/ws` carries every job's events; `/jobs/{id}/ws` carries one job's events
//! and closes after its terminal event. Both accept upload decisions from the
//! client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use social_recipes_core::job::JobStoreError;
use social_recipes_core::progress::PublishError;
use social_recipes_core::JobEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::handlers::error_response;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Message a client may send over either feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConfirmUpload {
        upload_id: String,
        selected_image_index: Option<usize>,
    },
    CancelUpload {
        upload_id: String,
    },
}

/// Direct reply to a client message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientReply {
    UploadResolved { upload_id: String, status: String },
    Error { message: String },
}

/// Global feed upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let events = state.publisher().subscribe_all();
    ws.on_upgrade(move |socket| handle_socket(socket, state, events, "global".to_string()))
}

/// Per-job feed upgrade handler. 404 for an unknown job.
pub async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.publisher().subscribe_job(&job_id) {
        Ok(events) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, events, job_id))
            .into_response(),
        Err(PublishError::JobStore(JobStoreError::NotFound(_))) => error_response(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", job_id),
        )
        .into_response(),
        Err(e) => {
            error!("Failed to subscribe to job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Apply a client's upload decision through the confirmation gate.
fn handle_client_message(state: &AppState, text: &str) -> ClientReply {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return ClientReply::Error {
                message: format!("Invalid message: {}", e),
            }
        }
    };

    let result = match message {
        ClientMessage::ConfirmUpload {
            upload_id,
            selected_image_index,
        } => state.gate().confirm(&upload_id, selected_image_index),
        ClientMessage::CancelUpload { upload_id } => state.gate().cancel(&upload_id),
    };

    match result {
        Ok(upload) => ClientReply::UploadResolved {
            upload_id: upload.id,
            status: upload.status.as_str().to_string(),
        },
        Err(e) => ClientReply::Error {
            message: e.to_string(),
        },
    }
}

/// Handle a single WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    mut events: broadcast::Receiver<JobEvent>,
    feed: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ClientReply>(16);

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(feed = %feed, "WebSocket client connected");

    let send_feed = feed.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                result = events.recv() => match result {
                    Ok(event) => {
                        WS_MESSAGES_SENT.with_label_values(&[event.kind()]).inc();
                        serde_json::to_string(&event)
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(feed = %send_feed, "WebSocket client lagged, skipped {} events", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(feed = %send_feed, "Event stream ended");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => serde_json::to_string(&reply),
                    None => break,
                },
            };

            match json {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize WebSocket message: {}", e),
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&state, text.as_str());
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!(feed = %feed, "WebSocket client disconnected");
}
