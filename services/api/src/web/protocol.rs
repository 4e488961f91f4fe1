//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for streaming the progress of a syllabus upload.

use serde::{Deserialize, Serialize};
use syllabus_core::{CompletionSummary, PipelineSnapshot};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: The document itself is sent as one raw Binary frame right after `Start`.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces the document that the next Binary frame carries.
    Start {
        class_id: Uuid,
        file_name: String,
        media_type: String,
    },

    /// The user closed the upload dialog. Tasks already created are kept.
    Cancel,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent on every stage transition; enough to draw the five-step indicator.
    Snapshot(PipelineSnapshot),

    /// The run reached `complete`.
    Completed(CompletionSummary),

    /// The run stopped before `complete`. `errors` are ready to show as-is.
    Error { message: String, errors: Vec<String> },

    /// The run was abandoned, either by the client or by a newer upload.
    Cancelled,
}
