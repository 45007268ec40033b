//! Prompt assembly for script generation
//!
//! The prompt is a fixed instruction block followed by a chat excerpt
//! (`- {author}: {body}` per message) and, when configured, reference
//! documents read from disk at startup.

use roomscribe_common::Message;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::extract::strip_html;

/// System instruction sent with every generation call
pub const SYSTEM_INSTRUCTION: &str = "営業トーク台本の体裁を厳格に守ってください。";

/// Reference documents longer than this many characters are truncated
pub const REFERENCE_CHAR_LIMIT: usize = 60_000;

const TRUNCATION_MARKER: &str = "\n...(truncated)";

const BASE_INSTRUCTION: &str = "\
あなたは、複数の業種に対応できる汎用的な営業トークを作成するプロです。

次の2つのタスクを、1）営業トークの作成 → 2）想定Q&Aの作成 の順番で実行してください。
読みやすさを重視し、句点と読点は自然な範囲で使ってください。

1）営業トークの作成
対象企業の業種や強みを踏まえ、以下の2つのプロットを作成してください。
名乗りでは商材名ではなく「ユーザー指定の企業名＋○○（担当者名）」を使ってください。
特定業界に限定する言い回しは避けてください。

プロット①（受付突破）
受付から担当者へ繋いでもらうための、営業感の薄い短いトークです。次の形を崩さないでください。
【担当者呼出テンプレート】
お世話になります。私、《企業名》の【○○】でございます。
《○○》のご責任者様は「お見えでしょうか？（午前）」「お戻りでしょうか？（午後）」
不在と言われた場合は「それであれば、《○○についてわかる方》におつなぎいただけますでしょうか？」と続けてください。

プロット②（営業対象者との通話）
1. 私は何者で（約5秒）
2. 何を目的に電話して（約5秒）
3. 相手にとってのメリット（約10秒）
の3ステップで構成してください。
「です・ます調」を基本に、硬すぎない話し言葉にしてください。
事例ベースで具体的な数字を盛り込み、切り返しは理由を伝えたあとに必ずクロージング文で締めてください。

2）想定Q&Aの作成
営業シーンで想定される質問と回答を複数パターン作成してください。
資料に記載されていない情報は補完せず、事実に基づかない創作は絶対にしないでください。

見出しには必ず「プロット①」「プロット②」「想定Q&A」を使ってください。";

/// Reference material appended to the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDocument {
    pub filename: String,
    pub text: String,
}

impl ReferenceDocument {
    /// Build a document, truncating oversized text
    pub fn new(filename: impl Into<String>, text: &str) -> Self {
        Self {
            filename: filename.into(),
            text: truncate_reference(text),
        }
    }
}

fn truncate_reference(text: &str) -> String {
    match text.char_indices().nth(REFERENCE_CHAR_LIMIT) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Read reference documents; unreadable or empty files are skipped
pub fn load_reference_documents(paths: &[PathBuf]) -> Vec<ReferenceDocument> {
    paths
        .iter()
        .filter_map(|path| match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                info!(path = %path.display(), chars = text.chars().count(), "Loaded reference document");
                Some(ReferenceDocument::new(display_name(path), &text))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable reference document");
                None
            }
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One excerpt line per message, HTML tags replaced by spaces
pub fn chat_excerpt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let body = strip_html(&m.body);
            format!("- {}: {}", m.author.name, body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full user prompt for a generation call
pub fn build_prompt(messages: &[Message], references: &[ReferenceDocument]) -> String {
    let mut prompt = format!("{}\n\n【チャット抜粋】\n{}", BASE_INSTRUCTION, chat_excerpt(messages));

    if !references.is_empty() {
        prompt.push_str("\n【参考資料】\n");
        let sections: Vec<String> = references
            .iter()
            .map(|doc| format!("- {}:\n{}", doc.filename, doc.text))
            .collect();
        prompt.push_str(&sections.join("\n\n"));
    }

    prompt
}
