//! Script generation via the OpenAI HTTP API
//!
//! Two request shapes:
//! - **Direct**: `POST /chat/completions` with a system + user message
//! - **Reasoning**: `POST /responses` with `reasoning.effort = "medium"`
//!
//! The caller narrows the chat context; this client only builds the prompt,
//! sends it and extracts the text.

use async_trait::async_trait;
use roomscribe_common::GenerationMode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::models::{GenerationRequest, GenerationResult};
use crate::services::prompt::{build_prompt, load_reference_documents, ReferenceDocument, SYSTEM_INSTRUCTION};

const DIRECT_TEMPERATURE: f64 = 0.7;
const REASONING_EFFORT: &str = "medium";

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("OpenAI API key is not configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("OpenAI API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Context error: {0}")]
    Context(String),
}

/// Anything that can turn a chat excerpt into a sales script
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(default)]
    content: Vec<ResponsesContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesResponse {
    /// Concatenated `output_text` parts across all output messages
    fn into_text(self) -> String {
        if let Some(text) = self.output_text {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|c| c.kind == "output_text")
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// OpenAI-backed script generator
pub struct OpenAiScriptGenerator {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_override: Option<String>,
    direct_model: String,
    reasoning_model: String,
    references: Vec<ReferenceDocument>,
}

impl OpenAiScriptGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model_override: config.model.clone().filter(|m| !m.trim().is_empty()),
            direct_model: config.direct_model.clone(),
            reasoning_model: config.reasoning_model.clone(),
            references: load_reference_documents(&config.reference_files),
        })
    }

    /// Model used for a mode, honoring the override
    pub fn model_for(&self, mode: GenerationMode) -> &str {
        if let Some(model) = &self.model_override {
            return model;
        }
        match mode {
            GenerationMode::Reasoning => &self.reasoning_model,
            GenerationMode::Direct => &self.direct_model,
        }
    }

    async fn post_json(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;

        let response = self
            .http_client
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn complete_direct(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": prompt},
            ],
            "temperature": DIRECT_TEMPERATURE,
        });

        let parsed: ChatCompletionResponse = self
            .post_json("chat/completions", body)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn complete_reasoning(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": model,
            "reasoning": {"effort": REASONING_EFFORT},
            "instructions": SYSTEM_INSTRUCTION,
            "input": prompt,
        });

        let parsed: ResponsesResponse = self
            .post_json("responses", body)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        Ok(parsed.into_text())
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiScriptGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let model = self.model_for(request.mode).to_string();
        let prompt = build_prompt(&request.messages, &self.references);

        info!(
            room_id = request.room_id,
            model = %model,
            mode = request.mode.as_str(),
            messages = request.messages.len(),
            trigger_message_id = ?request.trigger_message_id,
            prompt_chars = prompt.chars().count(),
            "Requesting script generation"
        );

        let content = match request.mode {
            GenerationMode::Direct => self.complete_direct(&model, &prompt).await?,
            GenerationMode::Reasoning => self.complete_reasoning(&model, &prompt).await?,
        };

        debug!(room_id = request.room_id, chars = content.chars().count(), "Generation response received");

        Ok(GenerationResult {
            content,
            model_id: model,
            mode: request.mode,
            context_messages: request.messages.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomscribe_common::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator_for(server: &MockServer, model: Option<&str>) -> OpenAiScriptGenerator {
        OpenAiScriptGenerator::new(&GenerationConfig {
            api_key: Some("sk-test".to_string()),
            base_url: server.uri(),
            model: model.map(String::from),
            ..GenerationConfig::default()
        })
        .unwrap()
    }

    fn request(mode: GenerationMode) -> GenerationRequest {
        GenerationRequest {
            room_id: 42,
            messages: vec![Message::new(4, "営業", "■基本情報\n株式会社サンプル")],
            mode,
            trigger_message_id: Some(4),
        }
    }

    #[tokio::test]
    async fn test_direct_mode_uses_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "プロット①こんにちは"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = generator_for(&server, None)
            .generate(&request(GenerationMode::Direct))
            .await
            .unwrap();

        assert_eq!(result.content, "プロット①こんにちは");
        assert_eq!(result.model_id, "gpt-4o-mini");
        assert_eq!(result.mode, GenerationMode::Direct);
        assert_eq!(result.context_messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reasoning_mode_uses_responses_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_partial_json(serde_json::json!({
                "model": "o4-mini",
                "reasoning": {"effort": "medium"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": [
                    {"type": "reasoning", "content": []},
                    {"type": "message", "content": [
                        {"type": "output_text", "text": "プロット①"},
                        {"type": "output_text", "text": "受付"}
                    ]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = generator_for(&server, None)
            .generate(&request(GenerationMode::Reasoning))
            .await
            .unwrap();

        assert_eq!(result.content, "プロット①受付");
        assert_eq!(result.model_id, "o4-mini");
    }

    #[tokio::test]
    async fn test_model_override_applies_to_both_modes() {
        let server = MockServer::start().await;
        let generator = generator_for(&server, Some("gpt-custom"));
        assert_eq!(generator.model_for(GenerationMode::Direct), "gpt-custom");
        assert_eq!(generator.model_for(GenerationMode::Reasoning), "gpt-custom");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = generator_for(&server, None)
            .generate(&request(GenerationMode::Direct))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let generator = OpenAiScriptGenerator::new(&GenerationConfig::default()).unwrap();
        let err = generator
            .generate(&request(GenerationMode::Direct))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey));
    }
}
