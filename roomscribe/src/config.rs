//! Configuration for the roomscribe service
//!
//! Two tiers, resolved once at startup:
//! 1. **TOML bootstrap file** (optional, see `roomscribe_common::config`)
//! 2. **Environment variables** for secrets and deployment toggles
//!    (environment wins over TOML)
//!
//! The minimum interval between generations is deliberately not part of the
//! configuration (see `monitor::scheduler::MIN_GENERATION_INTERVAL`).

use roomscribe_common::config::{env_flag, env_string, load_or_default, resolve_config_path};
use roomscribe_common::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::extract::ScriptSection;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ROOMSCRIBE_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub members: MembersConfig,
    pub generation: GenerationConfig,
    pub export: ExportConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "roomscribe=info,tower_http=info".to_string(),
        }
    }
}

/// Chat message source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MembersConfig {
    pub base_url: String,
    /// Bearer token (`MEMBERS_TOKEN`)
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MembersConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mem-bers.jp/web-api".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Generation client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// API key (`OPENAI_API_KEY`)
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model override applied to both modes (`OPENAI_MODEL`)
    pub model: Option<String>,
    pub direct_model: String,
    pub reasoning_model: String,
    /// Reference documents appended to the prompt
    pub reference_files: Vec<PathBuf>,
    /// Messages included when no trigger message narrows the context
    pub context_limit: usize,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: None,
            direct_model: "gpt-4o-mini".to_string(),
            reasoning_model: "o4-mini".to_string(),
            reference_files: Vec::new(),
            context_limit: 50,
            timeout_secs: 300,
        }
    }
}

/// Spreadsheet export
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Template spreadsheet copied for every export (`SHEETS_TEMPLATE_FILE_ID`)
    pub template_file_id: Option<String>,
    /// Drive folder for new documents (`GOOGLE_DRIVE_DESTINATION_FOLDER_ID`)
    pub destination_folder_id: Option<String>,
    /// Spreadsheet receiving one summary row per export (`RESULTS_SHEET_ID`)
    pub results_sheet_id: Option<String>,
    /// Grant "anyone with the link" edit access to new documents
    pub grant_editor_permission: bool,
    /// Inline service-account JSON (`GOOGLE_APPLICATION_CREDENTIALS_JSON`)
    pub credentials_json: Option<String>,
    /// Service-account JSON file (`GOOGLE_APPLICATION_CREDENTIALS`)
    pub credentials_path: Option<PathBuf>,
    pub formatting: FormattingConfig,
    pub layout: CellLayout,
}

impl ExportConfig {
    /// Template id if one is configured and non-blank
    pub fn template(&self) -> Option<&str> {
        self.template_file_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Delayed cosmetic formatting pass
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    pub enabled: bool,
    /// Apps Script project id (`GAS_PROJECT_ID`)
    pub script_id: Option<String>,
    pub function: String,
    pub delay_secs: u64,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            script_id: None,
            function: "formatKeywords".to_string(),
            delay_secs: 60,
        }
    }
}

impl FormattingConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Fixed cell locations (A1 notation) in the copied template
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CellLayout {
    pub basic_info: String,
    pub url: String,
    pub product: String,
    pub closing: String,
    pub script: String,
    pub plot1: String,
    pub plot2: String,
    pub plot3: String,
    pub plot4: String,
    pub plot5: String,
    pub qa: String,
}

impl Default for CellLayout {
    fn default() -> Self {
        Self {
            basic_info: "C1".to_string(),
            url: "F3".to_string(),
            product: "C6".to_string(),
            closing: "C13".to_string(),
            script: "C15".to_string(),
            plot1: "C17".to_string(),
            plot2: "C18".to_string(),
            plot3: "C19".to_string(),
            plot4: "C20".to_string(),
            plot5: "C21".to_string(),
            qa: "C23".to_string(),
        }
    }
}

impl CellLayout {
    /// Cell for a script segment
    pub fn section_cell(&self, section: ScriptSection) -> &str {
        match section {
            ScriptSection::Plot1 => &self.plot1,
            ScriptSection::Plot2 => &self.plot2,
            ScriptSection::Plot3 => &self.plot3,
            ScriptSection::Plot4 => &self.plot4,
            ScriptSection::Plot5 => &self.plot5,
            ScriptSection::QandA => &self.qa,
        }
    }
}

/// Monitoring session defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Poll interval when the observer does not pass one
    pub default_interval_ms: u64,
    /// Lower bound applied to observer-supplied intervals
    pub min_interval_ms: u64,
    pub heartbeat_secs: u64,
    /// Buffered observer events per session
    pub event_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 10_000,
            min_interval_ms: 1_000,
            heartbeat_secs: 25,
            event_buffer: 256,
        }
    }
}

impl MonitorConfig {
    /// Apply the default and the floor to an observer-supplied interval
    pub fn effective_interval_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|ms| *ms > 0)
            .unwrap_or(self.default_interval_ms)
            .max(self.min_interval_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl AppConfig {
    /// Resolve the config file, parse it and apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR)?;
        let mut config: AppConfig = load_or_default(path.as_deref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables win over TOML values
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_string("MEMBERS_TOKEN").or_else(|| env_string("MEMBERS_token")) {
            self.members.token = Some(token);
        }
        if let Some(key) = env_string("OPENAI_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = env_string("OPENAI_MODEL") {
            self.generation.model = Some(model);
        }
        if let Some(id) = env_string("SHEETS_TEMPLATE_FILE_ID") {
            self.export.template_file_id = Some(id);
        }
        if let Some(id) = env_string("GOOGLE_DRIVE_DESTINATION_FOLDER_ID") {
            self.export.destination_folder_id = Some(id);
        }
        if let Some(id) = env_string("RESULTS_SHEET_ID") {
            self.export.results_sheet_id = Some(id);
        }
        if let Some(json) = env_string("GOOGLE_APPLICATION_CREDENTIALS_JSON") {
            self.export.credentials_json = Some(json);
        }
        if let Some(path) = env_string("GOOGLE_APPLICATION_CREDENTIALS") {
            self.export.credentials_path = Some(PathBuf::from(path));
        }
        if env_flag("DISABLE_EDITOR_PERMISSION") == Some(true) {
            self.export.grant_editor_permission = false;
        }
        if env_flag("DISABLE_GAS_EXECUTION") == Some(true) {
            self.export.formatting.enabled = false;
        }
        if let Some(id) = env_string("GAS_PROJECT_ID") {
            self.export.formatting.script_id = Some(id);
        }
    }

    /// Log which integrations are configured (never the secrets)
    pub fn log_summary(&self) {
        info!(
            members_token = self.members.token.is_some(),
            openai_key = self.generation.api_key.is_some(),
            template = self.export.template().is_some(),
            results_log = self.export.results_sheet_id.is_some(),
            formatting = self.export.formatting.enabled,
            "Configuration resolved"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "MEMBERS_TOKEN",
        "MEMBERS_token",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "SHEETS_TEMPLATE_FILE_ID",
        "GOOGLE_DRIVE_DESTINATION_FOLDER_ID",
        "RESULTS_SHEET_ID",
        "GOOGLE_APPLICATION_CREDENTIALS_JSON",
        "GOOGLE_APPLICATION_CREDENTIALS",
        "DISABLE_EDITOR_PERMISSION",
        "DISABLE_GAS_EXECUTION",
        "GAS_PROJECT_ID",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:5780");
        assert_eq!(config.monitor.default_interval_ms, 10_000);
        assert_eq!(config.monitor.heartbeat_secs, 25);
        assert_eq!(config.generation.context_limit, 50);
        assert_eq!(config.export.layout.script, "C15");
        assert!(!config.export.formatting.enabled);
        assert!(config.export.template().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [export]
            template_file_id = "tmpl-123"

            [export.layout]
            qa = "D40"

            [monitor]
            default_interval_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.export.template(), Some("tmpl-123"));
        assert_eq!(config.export.layout.qa, "D40");
        assert_eq!(config.export.layout.basic_info, "C1");
        assert_eq!(config.monitor.default_interval_ms, 5000);
        assert_eq!(config.monitor.min_interval_ms, 1000);
    }

    #[test]
    fn test_blank_template_is_not_configured() {
        let mut config = AppConfig::default();
        config.export.template_file_id = Some("   ".to_string());
        assert!(config.export.template().is_none());
    }

    #[test]
    fn test_effective_interval_applies_floor() {
        let monitor = MonitorConfig::default();
        assert_eq!(monitor.effective_interval_ms(None), 10_000);
        assert_eq!(monitor.effective_interval_ms(Some(0)), 10_000);
        assert_eq!(monitor.effective_interval_ms(Some(200)), 1_000);
        assert_eq!(monitor.effective_interval_ms(Some(3_000)), 3_000);
    }

    #[test]
    #[serial]
    fn test_env_overrides_win() {
        clear_env();
        std::env::set_var("MEMBERS_TOKEN", "members-secret");
        std::env::set_var("SHEETS_TEMPLATE_FILE_ID", "tmpl-env");
        std::env::set_var("DISABLE_GAS_EXECUTION", "true");
        std::env::set_var("DISABLE_EDITOR_PERMISSION", "true");

        let mut config: AppConfig = toml::from_str(
            r#"
            [export]
            template_file_id = "tmpl-toml"
            grant_editor_permission = true

            [export.formatting]
            enabled = true
            "#,
        )
        .unwrap();
        config.apply_env_overrides();

        assert_eq!(config.members.token.as_deref(), Some("members-secret"));
        assert_eq!(config.export.template(), Some("tmpl-env"));
        assert!(!config.export.formatting.enabled);
        assert!(!config.export.grant_editor_permission);

        clear_env();
    }

    #[test]
    fn test_section_cells() {
        let layout = CellLayout::default();
        assert_eq!(layout.section_cell(ScriptSection::Plot1), "C17");
        assert_eq!(layout.section_cell(ScriptSection::Plot5), "C21");
        assert_eq!(layout.section_cell(ScriptSection::QandA), "C23");
    }
}
