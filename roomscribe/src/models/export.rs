//! Export request/outcome types

use chrono::{DateTime, Utc};
use roomscribe_common::Message;

use crate::extract::{
    chat::{BASIC_INFO_HEADER, CLOSING_INFO_HEADER, COMPANY_URL_HEADER, PRODUCT_INFO_HEADER},
    extract_company_basic_info, extract_section_body, extract_titles, Titles,
};

/// Input to the export pipeline
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Generated script text
    pub content: String,
    /// Chat messages the script was generated from
    pub context_messages: Vec<Message>,
    pub trigger_message_id: Option<i64>,
}

/// Structured fields derived from the chat context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFields {
    pub company_name: String,
    pub company_url: String,
    pub basic_info: String,
    pub url_info: String,
    pub product_info: String,
    pub closing_info: String,
    pub titles: Titles,
    /// Send time of the triggering message (falls back to the newest message)
    pub sent_at: Option<DateTime<Utc>>,
}

impl ExportFields {
    pub fn from_messages(messages: &[Message], trigger_message_id: Option<i64>) -> Self {
        let basic = extract_company_basic_info(messages);
        let sent_at = trigger_message_id
            .and_then(|id| messages.iter().find(|m| m.id == id))
            .or_else(|| messages.iter().max_by_key(|m| m.id))
            .map(|m| m.sent_at);

        Self {
            company_name: basic.company_name,
            company_url: basic.company_url,
            basic_info: extract_section_body(messages, BASIC_INFO_HEADER),
            url_info: extract_section_body(messages, COMPANY_URL_HEADER),
            product_info: extract_section_body(messages, PRODUCT_INFO_HEADER),
            closing_info: extract_section_body(messages, CLOSING_INFO_HEADER),
            titles: extract_titles(messages),
            sent_at,
        }
    }
}

/// Result of a successful export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub document_id: String,
    pub document_url: String,
    pub title: String,
    /// Sheet the cells were written to
    pub sheet_title: String,
    /// Non-fatal problems encountered on the way (rename, permission, folder)
    pub warnings: Vec<String>,
}
