//! External collaborators and the export pipeline

pub mod export_pipeline;
pub mod generation_client;
pub mod google_auth;
pub mod members_client;
pub mod prompt;
pub mod sheets_client;

pub use export_pipeline::{ExportError, ExportPipeline};
pub use generation_client::{GenerationError, OpenAiScriptGenerator, ScriptGenerator};
pub use google_auth::{AccessTokenSource, ServiceAccountAuth, ServiceAccountKey};
pub use members_client::{MembersClient, MessageSource, SourceError};
pub use sheets_client::{CellWrite, GoogleSheetsClient, SheetInfo, SheetsError, SpreadsheetApi};
