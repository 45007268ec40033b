//! Spreadsheet provider client (Google Drive v3, Sheets v4, Apps Script v1)
//!
//! Only the handful of calls the export pipeline needs are wrapped. Every
//! request carries a bearer token from an [`AccessTokenSource`]; Drive calls
//! pass `supportsAllDrives=true` so shared drives work as destinations.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::services::google_auth::AccessTokenSource;

const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
const SCRIPT_BASE_URL: &str = "https://script.googleapis.com/v1";

/// Spreadsheet provider errors
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Spreadsheet credentials are not configured")]
    MissingCredentials,

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Spreadsheet API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Script execution error: {0}")]
    Script(String),
}

/// Sheet identity within a spreadsheet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
}

/// One cell value addressed in A1 notation (without sheet prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub a1: String,
    pub value: String,
}

impl CellWrite {
    pub fn new(a1: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            a1: a1.into(),
            value: value.into(),
        }
    }
}

/// Spreadsheet operations used by the export pipeline
#[async_trait]
pub trait SpreadsheetApi: Send + Sync {
    /// Succeeds when the folder exists and is accessible
    async fn verify_folder(&self, folder_id: &str) -> Result<(), SheetsError>;

    /// Copy a file, returning the new file id
    async fn copy_file(&self, template_id: &str, name: &str, parent: Option<&str>) -> Result<String, SheetsError>;

    async fn first_sheet(&self, spreadsheet_id: &str) -> Result<SheetInfo, SheetsError>;

    async fn rename_sheet(&self, spreadsheet_id: &str, sheet_id: i64, title: &str) -> Result<(), SheetsError>;

    /// Anyone with the link may edit
    async fn grant_anyone_writer(&self, file_id: &str) -> Result<(), SheetsError>;

    async fn write_cells(&self, spreadsheet_id: &str, sheet_title: &str, cells: &[CellWrite]) -> Result<(), SheetsError>;

    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    async fn update_range(&self, spreadsheet_id: &str, range: &str, rows: Vec<Vec<String>>) -> Result<(), SheetsError>;

    /// Run an Apps Script function with positional parameters
    async fn run_script(&self, script_id: &str, function: &str, parameters: Vec<Value>) -> Result<(), SheetsError>;
}

/// Quote a sheet title for use in an A1 range (`'It''s'`)
pub fn quote_sheet_for_a1(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Browser URL of a spreadsheet
pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}/edit", spreadsheet_id)
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResource {
    #[serde(default)]
    sheets: Vec<SheetResource>,
}

#[derive(Debug, Deserialize)]
struct SheetResource {
    properties: Option<SheetInfo>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ScriptOperation {
    #[serde(default)]
    error: Option<Value>,
}

/// Google REST client
pub struct GoogleSheetsClient {
    http_client: reqwest::Client,
    auth: Arc<dyn AccessTokenSource>,
    drive_base: String,
    sheets_base: String,
    script_base: String,
}

impl GoogleSheetsClient {
    pub fn new(http_client: reqwest::Client, auth: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client,
            auth,
            drive_base: DRIVE_BASE_URL.to_string(),
            sheets_base: SHEETS_BASE_URL.to_string(),
            script_base: SCRIPT_BASE_URL.to_string(),
        }
    }

    /// HTTP client suitable for the provider calls
    pub fn default_http_client() -> Result<reqwest::Client, SheetsError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SheetsError::Network(e.to_string()))
    }

    /// Point all three APIs at one base URL (`{base}/drive/v3`, `{base}/v4`, `{base}/v1`)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.drive_base = format!("{base}/drive/v3");
        self.sheets_base = format!("{base}/v4");
        self.script_base = format!("{base}/v1");
        self
    }

    async fn request(&self, method: Method, url: String) -> Result<RequestBuilder, SheetsError> {
        let token = self.auth.access_token().await?;
        Ok(self.http_client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SheetsError> {
        let response = request
            .send()
            .await
            .map_err(|e| SheetsError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| SheetsError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SpreadsheetApi for GoogleSheetsClient {
    async fn verify_folder(&self, folder_id: &str) -> Result<(), SheetsError> {
        let url = format!("{}/files/{}", self.drive_base, folder_id);
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("supportsAllDrives", "true"), ("fields", "id")]);
        self.send(request).await.map(|_| ())
    }

    async fn copy_file(&self, template_id: &str, name: &str, parent: Option<&str>) -> Result<String, SheetsError> {
        let url = format!("{}/files/{}/copy", self.drive_base, template_id);
        let mut body = json!({ "name": name });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }

        let request = self
            .request(Method::POST, url)
            .await?
            .query(&[("supportsAllDrives", "true")])
            .json(&body);
        let file: FileResource = self.send_json(request).await?;

        let id = file
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SheetsError::Parse("copy response carried no file id".to_string()))?;
        debug!(template_id, new_id = %id, "Template copied");
        Ok(id)
    }

    async fn first_sheet(&self, spreadsheet_id: &str) -> Result<SheetInfo, SheetsError> {
        let url = format!("{}/spreadsheets/{}", self.sheets_base, spreadsheet_id);
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("fields", "sheets.properties")]);
        let spreadsheet: SpreadsheetResource = self.send_json(request).await?;

        spreadsheet
            .sheets
            .into_iter()
            .next()
            .and_then(|s| s.properties)
            .ok_or_else(|| SheetsError::Parse("spreadsheet has no sheets".to_string()))
    }

    async fn rename_sheet(&self, spreadsheet_id: &str, sheet_id: i64, title: &str) -> Result<(), SheetsError> {
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.sheets_base, spreadsheet_id);
        let body = json!({
            "requests": [{
                "updateSheetProperties": {
                    "properties": { "sheetId": sheet_id, "title": title },
                    "fields": "title"
                }
            }]
        });
        let request = self.request(Method::POST, url).await?.json(&body);
        self.send(request).await.map(|_| ())
    }

    async fn grant_anyone_writer(&self, file_id: &str) -> Result<(), SheetsError> {
        let url = format!("{}/files/{}/permissions", self.drive_base, file_id);
        let request = self
            .request(Method::POST, url)
            .await?
            .query(&[("supportsAllDrives", "true")])
            .json(&json!({ "role": "writer", "type": "anyone" }));
        self.send(request).await.map(|_| ())
    }

    async fn write_cells(&self, spreadsheet_id: &str, sheet_title: &str, cells: &[CellWrite]) -> Result<(), SheetsError> {
        let url = format!("{}/spreadsheets/{}/values:batchUpdate", self.sheets_base, spreadsheet_id);
        let sheet = quote_sheet_for_a1(sheet_title);
        let data: Vec<Value> = cells
            .iter()
            .map(|cell| {
                json!({
                    "range": format!("{}!{}", sheet, cell.a1),
                    "values": [[cell.value]],
                })
            })
            .collect();

        let request = self
            .request(Method::POST, url)
            .await?
            .json(&json!({ "valueInputOption": "RAW", "data": data }));
        self.send(request).await.map(|_| ())
    }

    async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = format!("{}/spreadsheets/{}/values/{}", self.sheets_base, spreadsheet_id, range);
        let request = self.request(Method::GET, url).await?;
        let value_range: ValueRange = self.send_json(request).await?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect())
    }

    async fn update_range(&self, spreadsheet_id: &str, range: &str, rows: Vec<Vec<String>>) -> Result<(), SheetsError> {
        let url = format!("{}/spreadsheets/{}/values/{}", self.sheets_base, spreadsheet_id, range);
        let request = self
            .request(Method::PUT, url)
            .await?
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "values": rows }));
        self.send(request).await.map(|_| ())
    }

    async fn run_script(&self, script_id: &str, function: &str, parameters: Vec<Value>) -> Result<(), SheetsError> {
        let url = format!("{}/scripts/{}:run", self.script_base, script_id);
        let request = self.request(Method::POST, url).await?.json(&json!({
            "function": function,
            "parameters": parameters,
            "devMode": true,
        }));
        let operation: ScriptOperation = self.send_json(request).await?;

        match operation.error {
            Some(error) => Err(SheetsError::Script(error.to_string())),
            None => Ok(()),
        }
    }
}
