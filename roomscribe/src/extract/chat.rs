//! Section extraction from chat messages
//!
//! Sales requests are posted into the room as loosely formatted messages where
//! each block starts with a `■` header, e.g.
//!
//! ```text
//! ■基本情報
//! 株式会社サンプル
//! ■企業URL
//! https://example.com
//! ```
//!
//! Bodies may contain HTML from the chat client, so they are stripped first.

use regex::Regex;
use roomscribe_common::Message;
use std::sync::OnceLock;

/// Marker that starts every section header
pub const SECTION_MARKER: char = '■';

pub const BASIC_INFO_HEADER: &str = "■基本情報";
pub const COMPANY_URL_HEADER: &str = "■企業URL";
pub const PRODUCT_INFO_HEADER: &str = "■商材情報";
pub const CLOSING_INFO_HEADER: &str = "■トーク情報(着地)";
pub const LIST_INFO_HEADER: &str = "■リスト情報";

const UNTITLED: &str = "無題";
const DEFAULT_SHEET_TITLE: &str = "default";

fn line_break_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>(\r?\n)?|</(p|div|li)>").expect("valid regex"))
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn company_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"■基本情報\s*([^\n■]+)").expect("valid regex"))
}

fn company_url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"■企業URL\s*([^\n■]+)").expect("valid regex"))
}

/// Convert chat HTML into plain text
///
/// Line-break tags and closing block tags become newlines, remaining tags are
/// dropped and the common entities are decoded.
pub fn strip_html(html: &str) -> String {
    let text = line_break_tags().replace_all(html, "\n");
    let text = any_tag().replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Body of the most recent section with the given header
///
/// Messages are scanned newest-first. The body runs from just after the
/// header to the next `■` marker (or end of message) and is trimmed.
/// Returns an empty string when no message carries the header.
pub fn extract_section_body(messages: &[Message], header: &str) -> String {
    for message in messages.iter().rev() {
        let text = strip_html(&message.body);
        if let Some(index) = text.find(header) {
            let from_header = &text[index + header.len()..];
            let content = match from_header.find(SECTION_MARKER) {
                Some(next) => &from_header[..next],
                None => from_header,
            };
            return content.trim().to_string();
        }
    }
    String::new()
}

/// Document and sheet titles derived from the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Titles {
    /// First line of the basic info section (document name)
    pub basic_info_title: String,
    /// First line of the list info section (sheet name)
    pub list_info_title: String,
}

pub fn extract_titles(messages: &[Message]) -> Titles {
    let basic_body = extract_section_body(messages, BASIC_INFO_HEADER);
    let list_body = extract_section_body(messages, LIST_INFO_HEADER);

    Titles {
        basic_info_title: first_line_or(&basic_body, UNTITLED),
        list_info_title: first_line_or(&list_body, DEFAULT_SHEET_TITLE),
    }
}

fn first_line_or(body: &str, fallback: &str) -> String {
    body.trim()
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Company name and URL as posted in the chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyBasicInfo {
    pub company_name: String,
    pub company_url: String,
}

/// Scan oldest-first; the last message with a match wins for each field
pub fn extract_company_basic_info(messages: &[Message]) -> CompanyBasicInfo {
    let mut info = CompanyBasicInfo::default();

    for message in messages {
        let text = strip_html(&message.body);

        if let Some(caps) = company_name_pattern().captures(&text) {
            info.company_name = caps[1].trim().to_string();
        }
        if let Some(caps) = company_url_pattern().captures(&text) {
            info.company_url = caps[1].trim().to_string();
        }
    }

    info
}
