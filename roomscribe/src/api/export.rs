//! Manual export endpoint
//!
//! Runs the export pipeline synchronously for a script the observer already
//! has. Responses use a flat `{"error": "..."}` body on failure.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use roomscribe_common::Message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::models::ExportRequest;
use crate::AppState;

/// POST /export request body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualExportRequest {
    pub chat_messages: Vec<Message>,
    pub generated_script: String,
}

/// POST /export success body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualExportResponse {
    pub ok: bool,
    pub document_id: String,
    pub document_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /export
pub async fn manual_export(State(state): State<AppState>, Json(body): Json<ManualExportRequest>) -> Response {
    let mut messages = body.chat_messages;
    messages.sort_by_key(|m| m.id);

    let request = ExportRequest {
        content: body.generated_script,
        context_messages: messages,
        trigger_message_id: None,
    };

    match state.export.export(&request).await {
        Ok(outcome) => {
            info!(document_id = %outcome.document_id, "Manual export completed");
            Json(ManualExportResponse {
                ok: true,
                document_id: outcome.document_id,
                document_url: outcome.document_url,
                warnings: outcome.warnings,
            })
            .into_response()
        }
        Err(e) if e.is_invalid_request() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            warn!(error = %e, "Manual export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/export", post(manual_export))
}
