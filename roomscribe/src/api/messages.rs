//! One-shot room snapshot

use axum::{
    extract::{Path, State},
    Json,
};
use roomscribe_common::Message;
use tracing::debug;

use crate::{ApiResult, AppState};

/// GET /rooms/{room_id}/messages
///
/// Current message list of the room, ascending by id.
pub async fn room_messages(State(state): State<AppState>, Path(room_id): Path<i64>) -> ApiResult<Json<Vec<Message>>> {
    let mut messages = state.source.fetch_messages(room_id).await?;
    messages.sort_by_key(|m| m.id);
    debug!(room_id, count = messages.len(), "Room snapshot served");
    Ok(Json(messages))
}
