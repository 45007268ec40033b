//! Chat room message source
//!
//! Fetches the full message list of a room from the members chat API:
//! `GET {base}/rooms/{room_id}/messages?force=1` with a bearer token.
//! `force=1` asks the API to return the latest messages even if they were
//! already delivered to this token.

use async_trait::async_trait;
use roomscribe_common::Message;
use std::time::Duration;
use thiserror::Error;

use crate::config::MembersConfig;

const USER_AGENT: &str = concat!("roomscribe/", env!("CARGO_PKG_VERSION"));

/// Message source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Members API token is not configured (set MEMBERS_TOKEN)")]
    MissingToken,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Members API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Anything that can list the messages of a chat room
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Full message list of the room, in whatever order the source returns it
    async fn fetch_messages(&self, room_id: i64) -> Result<Vec<Message>, SourceError>;
}

/// HTTP client for the members chat API
pub struct MembersClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl MembersClient {
    pub fn new(config: &MembersConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    fn messages_url(&self, room_id: i64) -> String {
        format!("{}/rooms/{}/messages?force=1", self.base_url, room_id)
    }
}

#[async_trait]
impl MessageSource for MembersClient {
    async fn fetch_messages(&self, room_id: i64) -> Result<Vec<Message>, SourceError> {
        let token = self.token.as_deref().ok_or(SourceError::MissingToken)?;

        tracing::debug!(room_id, "Fetching room messages");

        let response = self
            .http_client
            .get(self.messages_url(room_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // The API answers `null` for rooms without messages
        let messages: Option<Vec<Message>> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let messages = messages.unwrap_or_default();
        tracing::debug!(room_id, count = messages.len(), "Room messages fetched");
        Ok(messages)
    }
}
