//! Observer event types
//!
//! Every state transition of a monitoring session is reported to its observer
//! as an `ObserverEvent`. The session broadcaster stamps each event with a
//! sequence number and a timestamp, producing an `EventRecord`, which is what
//! travels over the SSE stream.
//!
//! Wire shape (one JSON object per SSE frame):
//!
//! ```json
//! { "seq": 3, "timestamp": "2024-01-01T00:00:00Z", "type": "status", "phase": "poll_ok" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// How the generation client produced its text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Reasoning model via the responses endpoint
    Reasoning,
    /// Plain chat completion
    Direct,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Reasoning => "reasoning",
            GenerationMode::Direct => "direct",
        }
    }
}

/// Progress phase carried by a `status` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StatusPhase {
    /// A poll found messages newer than the high-water mark
    PollOk,
    /// Generation pipeline acquired the room and is calling the generator
    GenerationStart {
        #[serde(rename = "triggerMessageId", skip_serializing_if = "Option::is_none")]
        trigger_message_id: Option<i64>,
    },
    /// Generator returned non-blank content
    GenerationDone {
        content: String,
        model: String,
        mode: GenerationMode,
    },
    ExportStart,
    ExportDone {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "documentUrl")]
        document_url: String,
    },
}

/// Event emitted to an observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverEvent {
    /// Sent once at session start
    Hello {
        #[serde(rename = "roomId")]
        room_id: i64,
        #[serde(rename = "intervalMs")]
        interval_ms: u64,
    },
    /// Transport keep-alive
    Ping { timestamp: i64 },
    /// Non-empty poll snapshot
    Messages { messages: Vec<Message> },
    Status {
        #[serde(flatten)]
        phase: StatusPhase,
    },
    /// Diagnostic text, only delivered when the session asked for it
    Debug { message: String },
    /// Caught failure; never terminates the session
    Error { message: String },
}

impl ObserverEvent {
    /// Event type name (used as the SSE `event:` field)
    pub fn event_type(&self) -> &'static str {
        match self {
            ObserverEvent::Hello { .. } => "hello",
            ObserverEvent::Ping { .. } => "ping",
            ObserverEvent::Messages { .. } => "messages",
            ObserverEvent::Status { .. } => "status",
            ObserverEvent::Debug { .. } => "debug",
            ObserverEvent::Error { .. } => "error",
        }
    }

    pub fn status(phase: StatusPhase) -> Self {
        ObserverEvent::Status { phase }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ObserverEvent::Error {
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        ObserverEvent::Debug {
            message: message.into(),
        }
    }

    /// Status phase name, if this is a status event
    pub fn phase_name(&self) -> Option<&'static str> {
        match self {
            ObserverEvent::Status { phase } => Some(match phase {
                StatusPhase::PollOk => "poll_ok",
                StatusPhase::GenerationStart { .. } => "generation_start",
                StatusPhase::GenerationDone { .. } => "generation_done",
                StatusPhase::ExportStart => "export_start",
                StatusPhase::ExportDone { .. } => "export_done",
            }),
            _ => None,
        }
    }
}

/// Ordered, timestamped event as delivered to the observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-session sequence number, starting at 0
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ObserverEvent,
}
