//! Test Helper Utilities
//!
//! In-memory stand-ins for the chat source, the generator and the
//! spreadsheet provider, plus a sink that records observer events.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use roomscribe::config::{AppConfig, ExportConfig};
use roomscribe::models::{GenerationRequest, GenerationResult};
use roomscribe::monitor::{
    Clock, EventSink, GenerationScheduler, ManualClock, RoomMonitor, RoomState, SchedulerSettings,
};
use roomscribe::services::generation_client::GenerationError;
use roomscribe::services::{
    CellWrite, ExportPipeline, MessageSource, ScriptGenerator, SheetInfo, SheetsError, SourceError,
    SpreadsheetApi,
};
use roomscribe::AppState;
use roomscribe_common::{GenerationMode, Message, ObserverEvent};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Notify};

pub const ROOM_ID: i64 = 196320;

/// Fixed start time for manual clocks
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap()
}

pub fn message(id: i64, body: &str) -> Message {
    Message::new(id, format!("user{id}"), body)
}

pub fn messages(ids: &[i64]) -> Vec<Message> {
    ids.iter().map(|id| message(*id, &format!("message {id}"))).collect()
}

/// Chat room whose snapshot the test controls
#[derive(Default)]
pub struct FakeSource {
    snapshot: Mutex<Vec<Message>>,
    failure: Mutex<Option<SourceError>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let source = Self::default();
        source.set(messages);
        source
    }

    pub fn set(&self, messages: Vec<Message>) {
        *self.snapshot.lock().unwrap() = messages;
    }

    pub fn push(&self, message: Message) {
        self.snapshot.lock().unwrap().push(message);
    }

    /// Fail the next fetch with the given error
    pub fn fail_next(&self, error: SourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn fetch_messages(&self, _room_id: i64) -> Result<Vec<Message>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Generator recording requests and concurrency
#[derive(Default)]
pub struct FakeGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
    reply: String,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// When set, every call waits for a notification before replying
    pub gate: Option<Arc<Notify>>,
    /// When set, the next call panics instead of replying
    panic_next: AtomicBool,
}

impl FakeGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    pub fn gated(reply: &str, gate: Arc<Notify>) -> Self {
        Self {
            reply: reply.to_string(),
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Generator whose first call panics
    pub fn panicking_once(reply: &str) -> Self {
        let generator = Self::replying(reply);
        generator.panic_next.store(true, Ordering::SeqCst);
        generator
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn triggers(&self) -> Vec<Option<i64>> {
        self.requests().iter().map(|r| r.trigger_message_id).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("generator crashed on trigger {:?}", request.trigger_message_id);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GenerationResult {
            content: self.reply.clone(),
            model_id: "fake-model".to_string(),
            mode: request.mode,
            context_messages: request.messages.clone(),
        })
    }
}

/// Sink keeping every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }

    pub fn phases(&self) -> Vec<&'static str> {
        self.events().iter().filter_map(|e| e.phase_name()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObserverEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ObserverEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn debug_enabled(&self) -> bool {
        true
    }
}

/// Spreadsheet provider that accepts everything
#[derive(Default)]
pub struct FakeSheets {
    pub copies: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<CellWrite>>,
    /// Make sheet renames fail (a non-fatal export step)
    pub fail_rename: bool,
}

#[async_trait]
impl SpreadsheetApi for FakeSheets {
    async fn verify_folder(&self, _folder_id: &str) -> Result<(), SheetsError> {
        Ok(())
    }

    async fn copy_file(&self, _template_id: &str, name: &str, _parent: Option<&str>) -> Result<String, SheetsError> {
        self.copies.lock().unwrap().push(name.to_string());
        Ok("doc-42".to_string())
    }

    async fn first_sheet(&self, _spreadsheet_id: &str) -> Result<SheetInfo, SheetsError> {
        Ok(SheetInfo {
            sheet_id: 0,
            title: "Sheet1".to_string(),
        })
    }

    async fn rename_sheet(&self, _spreadsheet_id: &str, _sheet_id: i64, _title: &str) -> Result<(), SheetsError> {
        if self.fail_rename {
            return Err(SheetsError::Api {
                status: 403,
                body: "rename forbidden".to_string(),
            });
        }
        Ok(())
    }

    async fn grant_anyone_writer(&self, _file_id: &str) -> Result<(), SheetsError> {
        Ok(())
    }

    async fn write_cells(&self, _spreadsheet_id: &str, _sheet_title: &str, cells: &[CellWrite]) -> Result<(), SheetsError> {
        self.writes.lock().unwrap().extend_from_slice(cells);
        Ok(())
    }

    async fn read_range(&self, _spreadsheet_id: &str, _range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        Ok(Vec::new())
    }

    async fn update_range(&self, _spreadsheet_id: &str, _range: &str, _rows: Vec<Vec<String>>) -> Result<(), SheetsError> {
        Ok(())
    }

    async fn run_script(&self, _script_id: &str, _function: &str, _parameters: Vec<Value>) -> Result<(), SheetsError> {
        Ok(())
    }
}

pub fn export_config(template: Option<&str>) -> ExportConfig {
    ExportConfig {
        template_file_id: template.map(str::to_string),
        ..ExportConfig::default()
    }
}

/// Monitor wired to fakes, with handles on every collaborator
pub struct MonitorHarness {
    pub monitor: RoomMonitor,
    pub source: Arc<FakeSource>,
    pub generator: Arc<FakeGenerator>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

impl MonitorHarness {
    pub fn new(source: FakeSource, generator: FakeGenerator) -> Self {
        Self::build(source, generator, RoomState::new(), false, 50)
    }

    pub fn build(
        source: FakeSource,
        generator: FakeGenerator,
        state: RoomState,
        generate_on_connect: bool,
        context_limit: usize,
    ) -> Self {
        Self::assemble(source, generator, state, generate_on_connect, context_limit, None)
    }

    /// Monitor that exports every generated script through `export`
    pub fn exporting(source: FakeSource, generator: FakeGenerator, export: Arc<ExportPipeline>) -> Self {
        Self::assemble(source, generator, RoomState::new(), false, 50, Some(export))
    }

    fn assemble(
        source: FakeSource,
        generator: FakeGenerator,
        state: RoomState,
        generate_on_connect: bool,
        context_limit: usize,
        export: Option<Arc<ExportPipeline>>,
    ) -> Self {
        let export_on_generate = export.is_some();
        let source = Arc::new(source);
        let generator = Arc::new(generator);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(t0()));

        let scheduler = GenerationScheduler::new(
            ROOM_ID,
            Arc::new(AsyncMutex::new(state)),
            generator.clone(),
            export,
            sink.clone(),
            clock.clone() as Arc<dyn Clock>,
            SchedulerSettings {
                mode: GenerationMode::Direct,
                export_on_generate,
                context_limit,
            },
        );
        let monitor = RoomMonitor::new(ROOM_ID, source.clone(), scheduler, sink.clone(), generate_on_connect);

        Self {
            monitor,
            source,
            generator,
            sink,
            clock,
        }
    }

    pub async fn last_seen(&self) -> Option<i64> {
        self.monitor.state().lock().await.last_seen_message_id()
    }

    pub async fn queued(&self) -> Vec<i64> {
        self.monitor
            .state()
            .lock()
            .await
            .pending()
            .iter()
            .map(|e| e.trigger_message_id)
            .collect()
    }
}

/// Router state backed by fakes
pub struct AppHarness {
    pub state: AppState,
    pub source: Arc<FakeSource>,
    pub generator: Arc<FakeGenerator>,
    pub sheets: Arc<FakeSheets>,
}

pub fn app_harness(export: ExportConfig) -> AppHarness {
    let source = Arc::new(FakeSource::with_messages(messages(&[3, 1, 2])));
    let generator = Arc::new(FakeGenerator::replying("プロット①受付\nプロット②担当\n想定Q&A質問"));
    let sheets = Arc::new(FakeSheets::default());

    let config = AppConfig {
        export: export.clone(),
        ..AppConfig::default()
    };
    let pipeline = Arc::new(ExportPipeline::new(Some(sheets.clone()), export));
    let state = AppState::new(
        config,
        source.clone(),
        generator.clone(),
        pipeline,
        Arc::new(ManualClock::new(t0())),
    );

    AppHarness {
        state,
        source,
        generator,
        sheets,
    }
}
