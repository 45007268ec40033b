//! Observer SSE stream
//!
//! Opening the stream starts a [`MonitorSession`] for the room; closing it
//! tears the session down. Every SSE frame carries one `EventRecord` as JSON
//! and uses the record's `type` as the SSE event name.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use roomscribe_common::GenerationMode;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::session::{MonitorSession, SessionParams};
use crate::AppState;

/// Query parameters of `GET /rooms/{room_id}/stream`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub interval_ms: Option<u64>,
    pub generate_on_connect: Option<String>,
    pub export_on_generate: Option<String>,
    pub debug: Option<String>,
    pub use_reasoning: Option<String>,
    pub last_id: Option<i64>,
}

/// `1`/`true`/`yes` → true, `0`/`false`/`no` → false, anything else → default
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl StreamQuery {
    pub fn into_params(self, room_id: i64, monitor: &MonitorConfig) -> SessionParams {
        let use_reasoning = parse_flag(self.use_reasoning.as_deref(), true);
        SessionParams {
            room_id,
            interval: Duration::from_millis(monitor.effective_interval_ms(self.interval_ms)),
            generate_on_connect: parse_flag(self.generate_on_connect.as_deref(), false),
            export_on_generate: parse_flag(self.export_on_generate.as_deref(), false),
            debug: parse_flag(self.debug.as_deref(), false),
            mode: if use_reasoning {
                GenerationMode::Reasoning
            } else {
                GenerationMode::Direct
            },
            resume_from: self.last_id.filter(|id| *id > 0),
        }
    }
}

/// GET /rooms/{room_id}/stream
pub async fn room_event_stream(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let params = query.into_params(room_id, &state.config.monitor);
    let (session, mut rx) = MonitorSession::start(params, &state.session_deps);
    info!(session_id = %session.id(), room_id, "Observer connected");

    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        // Dropping the stream (observer gone) drops the session and stops its timers
        let _session = session;

        loop {
            let record = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(room_id, "Server shutting down, closing observer stream");
                    break;
                }
                record = rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            let event_type = record.event.event_type();
            match serde_json::to_string(&record) {
                Ok(json) => {
                    debug!(seq = record.seq, event_type, "SSE: sending event");
                    yield Ok(Event::default().event(event_type).data(json));
                }
                Err(e) => warn!(event_type, error = %e, "SSE: failed to serialize event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
