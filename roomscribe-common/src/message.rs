//! Chat message model
//!
//! Messages are immutable snapshots of what the upstream chat room returned.
//! The monitor only reads them and tracks the highest id it has processed.
//!
//! Deserialization accepts both the observer shape (`id`, `author`, `sentAt`)
//! and the upstream shape (`message_id`, `account`, `send_time` in unix
//! seconds) so that observers can post back messages exactly as they
//! received them from either side.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, alias = "account_id")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// A single chat message in a monitored room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic per room, unique
    #[serde(alias = "message_id")]
    pub id: i64,
    #[serde(default, alias = "account", deserialize_with = "null_as_default")]
    pub author: Author,
    #[serde(default)]
    pub body: String,
    #[serde(
        alias = "send_time",
        alias = "sent_at",
        deserialize_with = "timestamp_from_any",
        default = "epoch"
    )]
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: i64, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            author: Author {
                id: 0,
                name: author.into(),
            },
            body: body.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Highest message id in a snapshot
pub fn max_id(messages: &[Message]) -> Option<i64> {
    messages.iter().map(|m| m.id).max()
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn null_as_default<'de, D>(deserializer: D) -> Result<Author, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Author>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(i64),
    Text(String),
}

fn timestamp_from_any<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Seconds(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs))),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
    }
}
