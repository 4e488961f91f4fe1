//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! The client announces a document, sends its bytes, and receives a snapshot
//! on every pipeline transition until the run ends.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
    upload_task::{upload_process, UploadError, UploadRequest},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use syllabus_core::PipelineSnapshot;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

/// A `Start` message waiting for its Binary frame.
struct PendingUpload {
    class_id: Uuid,
    file_name: String,
    media_type: String,
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!(%user_id, "New WebSocket connection established");

    // The sender is shared with the per-run forwarding task.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let mut pending: Option<PendingUpload> = None;
    // The run this connection started last, with the key it was registered under.
    let mut current: Option<(Uuid, JoinHandle<()>)> = None;

    // --- 1. Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%user_id, error = %e, "WebSocket receive failed");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Start {
                    class_id,
                    file_name,
                    media_type,
                }) => {
                    info!(%user_id, %class_id, file = %file_name, "Upload announced");
                    pending = Some(PendingUpload {
                        class_id,
                        file_name,
                        media_type,
                    });
                }
                Ok(ClientMessage::Cancel) => {
                    info!(%user_id, "Cancel message received");
                    pending = None;
                    if let Some((key, _)) = &current {
                        app_state.runs.cancel(user_id, *key).await;
                    }
                }
                Err(e) => {
                    warn!("Failed to deserialize client message: {}", e);
                }
            },
            Message::Binary(data) => {
                let Some(upload) = pending.take() else {
                    send_message(
                        &ws_sender,
                        &ServerMessage::Error {
                            message: "Send a start message before the document.".to_string(),
                            errors: vec![],
                        },
                    )
                    .await;
                    continue;
                };
                let request = UploadRequest {
                    run_key: Uuid::new_v4(),
                    class_id: upload.class_id,
                    file_name: upload.file_name,
                    media_type: upload.media_type,
                    bytes: data,
                };
                // A new upload supersedes the running one; the registry cancels it.
                let key = request.run_key;
                let handle = spawn_upload(app_state.clone(), ws_sender.clone(), user_id, request);
                current = Some((key, handle));
            }
            Message::Close(_) => {
                info!("Client sent close message.");
                break;
            }
            _ => {}
        }
    }

    // --- 2. Cleanup ---
    // Closing the dialog abandons this connection's run; tasks already created
    // are kept. A newer run started elsewhere is left alone.
    if let Some((key, handle)) = current {
        if !handle.is_finished() {
            app_state.runs.cancel(user_id, key).await;
        }
    }
    info!(%user_id, "WebSocket connection closed.");
}

fn spawn_upload(
    app_state: Arc<AppState>,
    ws_sender: WsSender,
    user_id: Uuid,
    request: UploadRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineSnapshot>();

        let forwarder = {
            let ws_sender = ws_sender.clone();
            tokio::spawn(async move {
                while let Some(snapshot) = rx.recv().await {
                    send_message(&ws_sender, &ServerMessage::Snapshot(snapshot)).await;
                }
            })
        };

        let outcome = upload_process(app_state, user_id, request, &tx).await;
        drop(tx);
        if let Err(e) = forwarder.await {
            error!("Snapshot forwarder failed: {:?}", e);
        }

        let final_message = match outcome {
            Ok(run) => match run.completion_summary() {
                Some(summary) => ServerMessage::Completed(summary),
                None => ServerMessage::Error {
                    message: "The syllabus could not be processed.".to_string(),
                    errors: run.errors,
                },
            },
            Err(UploadError::Cancelled) => ServerMessage::Cancelled,
            Err(UploadError::ClassNotFound(class_id)) => ServerMessage::Error {
                message: format!("Class {class_id} was not found."),
                errors: vec![],
            },
            Err(e) => {
                error!(%user_id, error = %e, "Upload failed");
                ServerMessage::Error {
                    message: "Something went wrong while processing your syllabus. Please try again."
                        .to_string(),
                    errors: vec![],
                }
            }
        };
        send_message(&ws_sender, &final_message).await;
    })
}

/// Serializes and sends one text frame, logging instead of failing.
async fn send_message(ws_sender: &WsSender, msg: &ServerMessage) {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return;
        }
    };
    if ws_sender.lock().await.send(Message::Text(json.into())).await.is_err() {
        warn!("Failed to send message; client likely disconnected.");
    }
}
