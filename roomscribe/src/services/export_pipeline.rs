//! Export pipeline: generated script + chat context → templated spreadsheet
//!
//! Steps, in order:
//! 1. Derive fields from the chat context and split the script into segments
//! 2. Verify the destination folder (inaccessible → provider default, warning)
//! 3. Copy the template, named after the basic-info title
//! 4. Rename the first sheet to the list-info title (non-fatal)
//! 5. Grant link edit access when enabled (non-fatal)
//! 6. Write fields and segments into the configured cells
//!
//! The results-log append and the delayed formatting pass run detached on a
//! [`TaskTracker`] after the cells are written; their failures are logged only.

use chrono::{DateTime, Utc};
use roomscribe_common::time::format_log_timestamp;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::extract::{split_script_by_sections, ScriptSection, ScriptSections};
use crate::models::{ExportFields, ExportOutcome, ExportRequest};
use crate::services::sheets_client::{spreadsheet_url, CellWrite, SheetsError, SpreadsheetApi};

/// Range scanned to find the next free results-log row
const RESULTS_LOG_RANGE: &str = "A:D";

/// Export pipeline errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export template is not configured (set SHEETS_TEMPLATE_FILE_ID)")]
    NotConfigured,

    #[error("No chat messages to export")]
    EmptyContext,

    #[error("Generated script is empty")]
    BlankScript,

    #[error(transparent)]
    Sheets(#[from] SheetsError),
}

impl ExportError {
    /// Errors caused by the request rather than the provider
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            ExportError::NotConfigured | ExportError::EmptyContext | ExportError::BlankScript
        )
    }
}

pub struct ExportPipeline {
    api: Option<Arc<dyn SpreadsheetApi>>,
    config: ExportConfig,
    side_tasks: TaskTracker,
}

impl ExportPipeline {
    /// `api` is `None` when no spreadsheet credentials are available
    pub fn new(api: Option<Arc<dyn SpreadsheetApi>>, config: ExportConfig) -> Self {
        Self {
            api,
            config,
            side_tasks: TaskTracker::new(),
        }
    }

    /// True when a template is configured
    pub fn is_configured(&self) -> bool {
        self.config.template().is_some()
    }

    /// Wait for detached side tasks spawned so far
    pub async fn wait_for_side_tasks(&self) {
        self.side_tasks.close();
        self.side_tasks.wait().await;
        self.side_tasks.reopen();
    }

    pub async fn export(&self, request: &ExportRequest) -> Result<ExportOutcome, ExportError> {
        let template_id = self.config.template().ok_or(ExportError::NotConfigured)?;
        if request.context_messages.is_empty() {
            return Err(ExportError::EmptyContext);
        }
        if request.content.trim().is_empty() {
            return Err(ExportError::BlankScript);
        }
        let api = self.api.clone().ok_or(SheetsError::MissingCredentials)?;

        let fields = ExportFields::from_messages(&request.context_messages, request.trigger_message_id);
        let sections = split_script_by_sections(&request.content);
        let mut warnings = Vec::new();

        let title = fields.titles.basic_info_title.clone();
        let parent = self.resolve_destination(api.as_ref(), &mut warnings).await;

        info!(template_id, title = %title, parent = ?parent, "Copying export template");
        let document_id = api.copy_file(template_id, &title, parent.as_deref()).await?;

        let first_sheet = api.first_sheet(&document_id).await?;
        let wanted_title = &fields.titles.list_info_title;
        let sheet_title = match api.rename_sheet(&document_id, first_sheet.sheet_id, wanted_title).await {
            Ok(()) => wanted_title.clone(),
            Err(e) => {
                warnings.push(warning(format!("Sheet rename to '{wanted_title}' failed: {e}")));
                first_sheet.title
            }
        };

        if self.config.grant_editor_permission {
            if let Err(e) = api.grant_anyone_writer(&document_id).await {
                warnings.push(warning(format!("Editor permission grant failed: {e}")));
            }
        }

        let cells = self.cell_writes(&fields, &request.content, &sections);
        debug!(document_id = %document_id, sheet = %sheet_title, cells = cells.len(), "Writing cells");
        api.write_cells(&document_id, &sheet_title, &cells).await?;

        let document_url = spreadsheet_url(&document_id);
        info!(document_id = %document_id, url = %document_url, "Export completed");

        self.spawn_results_log(api.clone(), &fields, &title, &document_url);
        self.spawn_formatting(api, &document_id);

        Ok(ExportOutcome {
            document_id,
            document_url,
            title,
            sheet_title,
            warnings,
        })
    }

    async fn resolve_destination(&self, api: &dyn SpreadsheetApi, warnings: &mut Vec<String>) -> Option<String> {
        let folder_id = self
            .config
            .destination_folder_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())?;

        match api.verify_folder(folder_id).await {
            Ok(()) => Some(folder_id.to_string()),
            Err(e) => {
                warnings.push(warning(format!(
                    "Destination folder {folder_id} is not accessible, using default location: {e}"
                )));
                None
            }
        }
    }

    fn cell_writes(&self, fields: &ExportFields, content: &str, sections: &ScriptSections) -> Vec<CellWrite> {
        let layout = &self.config.layout;
        let mut cells = vec![
            CellWrite::new(&layout.basic_info, &fields.basic_info),
            CellWrite::new(&layout.url, &fields.url_info),
            CellWrite::new(&layout.product, &fields.product_info),
            CellWrite::new(&layout.closing, &fields.closing_info),
            CellWrite::new(&layout.script, content),
        ];
        cells.extend(
            ScriptSection::ALL
                .iter()
                .map(|section| CellWrite::new(layout.section_cell(*section), sections.get(*section))),
        );
        cells
    }

    fn spawn_results_log(&self, api: Arc<dyn SpreadsheetApi>, fields: &ExportFields, title: &str, document_url: &str) {
        let Some(results_sheet_id) = self
            .config
            .results_sheet_id
            .clone()
            .filter(|id| !id.trim().is_empty())
        else {
            return;
        };

        let row = results_log_row(fields.sent_at.unwrap_or_else(Utc::now), &fields.company_name, title, document_url);

        self.side_tasks.spawn(async move {
            if let Err(e) = append_results_row(api.as_ref(), &results_sheet_id, row).await {
                warn!(results_sheet_id = %results_sheet_id, error = %e, "Results log append failed");
            }
        });
    }

    fn spawn_formatting(&self, api: Arc<dyn SpreadsheetApi>, document_id: &str) {
        let formatting = &self.config.formatting;
        if !formatting.enabled {
            debug!(document_id, "Formatting pass disabled");
            return;
        }
        let Some(script_id) = formatting.script_id.clone().filter(|id| !id.trim().is_empty()) else {
            warn!("Formatting pass enabled but no script id is configured");
            return;
        };

        let function = formatting.function.clone();
        let delay = formatting.delay();
        let document_id = document_id.to_string();
        info!(document_id = %document_id, delay_secs = delay.as_secs(), "Formatting pass scheduled");

        self.side_tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            match api.run_script(&script_id, &function, vec![json!(document_id)]).await {
                Ok(()) => info!(document_id = %document_id, "Formatting pass completed"),
                Err(e) => warn!(document_id = %document_id, error = %e, "Formatting pass failed"),
            }
        });
    }
}

/// Log a non-fatal problem and return its text
fn warning(message: String) -> String {
    warn!("{}", message);
    message
}

/// Results-log row: timestamp, company name, document title, document URL
pub fn results_log_row(sent_at: DateTime<Utc>, company_name: &str, title: &str, document_url: &str) -> Vec<String> {
    vec![
        format_log_timestamp(sent_at),
        company_name.to_string(),
        title.to_string(),
        document_url.to_string(),
    ]
}

async fn append_results_row(api: &dyn SpreadsheetApi, results_sheet_id: &str, row: Vec<String>) -> Result<(), SheetsError> {
    let existing = api.read_range(results_sheet_id, RESULTS_LOG_RANGE).await?;
    let next_row = existing.len() + 1;
    let range = format!("A{next_row}:D{next_row}");
    api.update_range(results_sheet_id, &range, vec![row]).await?;
    info!(results_sheet_id, row = next_row, "Results log row appended");
    Ok(())
}
