//! Generation request/result types

use roomscribe_common::{GenerationMode, Message};

/// Input to the generation client
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub room_id: i64,
    /// Messages the script is generated from (already narrowed by the caller)
    pub messages: Vec<Message>,
    pub mode: GenerationMode,
    /// Set when the request is scoped to a single inbound message
    pub trigger_message_id: Option<i64>,
}

/// Output of one successful generation call
///
/// Consumed by the export step and then dropped; only the last one is shown
/// to the observer (via the `generation_done` event).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub content: String,
    pub model_id: String,
    pub mode: GenerationMode,
    pub context_messages: Vec<Message>,
}

impl GenerationResult {
    /// Blank output is treated as a failed generation
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        let mut result = GenerationResult {
            content: " \n\t".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            mode: GenerationMode::Direct,
            context_messages: Vec::new(),
        };
        assert!(result.is_blank());

        result.content = "プロット①".to_string();
        assert!(!result.is_blank());
    }
}
