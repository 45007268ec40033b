//! HTTP API handlers
//!
//! - `GET /health`
//! - `GET /rooms/{room_id}/stream` (observer SSE stream)
//! - `GET /rooms/{room_id}/messages`
//! - `POST /export`

pub mod export;
pub mod health;
pub mod messages;
pub mod stream;

pub use export::export_routes;
pub use health::health_routes;
pub use stream::room_event_stream;

use axum::{routing::get, Router};

use crate::AppState;

/// Room-scoped routes
pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/:room_id/stream", get(stream::room_event_stream))
        .route("/rooms/:room_id/messages", get(messages::room_messages))
}
