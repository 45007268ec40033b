//! Generation scheduler: single-flight, cooldown and deferred replay per room
//!
//! Decision order for every request:
//! 1. A generation is already running → dropped (logged only)
//! 2. Last completed generation is younger than [`MIN_GENERATION_INTERVAL`]
//!    → the trigger (if any) is queued, eligible once the interval has passed
//! 3. Otherwise the room is marked busy and the generation + export pipeline
//!    is spawned; the caller never waits for it
//!
//! The cooldown clock advances only when the pipeline produced output. A
//! failed or blank generation leaves the room immediately eligible again.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use roomscribe_common::{GenerationMode, Message, ObserverEvent, StatusPhase};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{ExportRequest, GenerationRequest, GenerationResult};
use crate::monitor::clock::Clock;
use crate::monitor::room_state::RoomState;
use crate::monitor::sink::EventSink;
use crate::services::generation_client::{GenerationError, ScriptGenerator};
use crate::services::ExportPipeline;

/// Minimum time between the end of one generation and the start of the next
pub const MIN_GENERATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Messages used as context when no trigger narrows it
pub const DEFAULT_CONTEXT_LIMIT: usize = 50;

fn min_interval() -> chrono::Duration {
    chrono::Duration::seconds(MIN_GENERATION_INTERVAL.as_secs() as i64)
}

/// Per-session generation settings
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub mode: GenerationMode,
    pub export_on_generate: bool,
    pub context_limit: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Reasoning,
            export_on_generate: false,
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

/// What happened to a generation request
#[derive(Debug)]
pub enum RequestOutcome {
    /// Another generation is in flight
    Dropped,
    /// Deferred by the cooldown
    Queued { eligible_at: DateTime<Utc> },
    /// Deferred, and the trigger was already waiting in the queue
    AlreadyQueued,
    /// Cooling down and there was no trigger to remember
    Skipped,
    /// Pipeline spawned
    Started(JoinHandle<()>),
}

impl RequestOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, RequestOutcome::Started(_))
    }

    /// Wait for a spawned pipeline to finish
    pub async fn finished(self) {
        if let RequestOutcome::Started(handle) = self {
            if let Err(e) = handle.await {
                warn!(error = %e, "Generation task ended abnormally");
            }
        }
    }
}

/// Scheduler for one room; cheap to clone
#[derive(Clone)]
pub struct GenerationScheduler {
    room_id: i64,
    state: Arc<Mutex<RoomState>>,
    generator: Arc<dyn ScriptGenerator>,
    export: Option<Arc<ExportPipeline>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
}

impl GenerationScheduler {
    pub fn new(
        room_id: i64,
        state: Arc<Mutex<RoomState>>,
        generator: Arc<dyn ScriptGenerator>,
        export: Option<Arc<ExportPipeline>>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            room_id,
            state,
            generator,
            export,
            sink,
            clock,
            settings,
        }
    }

    pub fn state(&self) -> &Arc<Mutex<RoomState>> {
        &self.state
    }

    /// Run or defer a generation for the room
    ///
    /// `context` is the full snapshot; it is narrowed to the trigger message
    /// (or the latest messages) when the pipeline runs.
    pub async fn request_generation(&self, context: Arc<[Message]>, trigger: Option<i64>) -> RequestOutcome {
        let mut state = self.state.lock().await;

        if state.is_generating {
            debug!(room_id = self.room_id, trigger = ?trigger, "Generation in flight, request dropped");
            self.sink
                .debug(format!("generation already running, request for {trigger:?} dropped"));
            return RequestOutcome::Dropped;
        }

        if let Some(completed_at) = state.last_generation_completed_at {
            let eligible_at = completed_at + min_interval();
            if self.clock.now() < eligible_at {
                let outcome = match trigger {
                    Some(id) if state.enqueue(id, eligible_at) => RequestOutcome::Queued { eligible_at },
                    Some(_) => RequestOutcome::AlreadyQueued,
                    None => RequestOutcome::Skipped,
                };
                info!(
                    room_id = self.room_id,
                    trigger = ?trigger,
                    eligible_at = %eligible_at,
                    queued = state.pending().len(),
                    "Generation deferred by cooldown"
                );
                self.sink
                    .debug(format!("cooldown active until {eligible_at}, trigger {trigger:?} deferred"));
                return outcome;
            }
        }

        state.is_generating = true;
        drop(state);

        let this = self.clone();
        RequestOutcome::Started(tokio::spawn(async move {
            let pipeline = AssertUnwindSafe(this.run_pipeline(context, trigger));
            if pipeline.catch_unwind().await.is_err() {
                this.recover_from_panic(trigger).await;
            }
        }))
    }

    /// Replay queued triggers whose cooldown has elapsed
    ///
    /// Each eligible entry is attempted at most once per call. Once one of
    /// them starts a generation the rest go back to the front of the queue,
    /// and nothing is drained while a generation is in flight.
    pub async fn drain_queue(&self, context: Arc<[Message]>) -> Vec<RequestOutcome> {
        let eligible = {
            let mut state = self.state.lock().await;
            if state.is_generating || state.pending().is_empty() {
                return Vec::new();
            }
            state.take_eligible(self.clock.now())
        };

        let mut outcomes = Vec::with_capacity(eligible.len());
        let mut entries = eligible.into_iter();
        while let Some(entry) = entries.next() {
            debug!(room_id = self.room_id, trigger = entry.trigger_message_id, "Replaying queued trigger");
            let outcome = self
                .request_generation(context.clone(), Some(entry.trigger_message_id))
                .await;
            let started = outcome.is_started();
            outcomes.push(outcome);

            if started {
                let rest: Vec<_> = entries.collect();
                if !rest.is_empty() {
                    self.state.lock().await.requeue_front(rest);
                }
                break;
            }
        }
        outcomes
    }

    /// A panicking pipeline must not leave the room locked
    async fn recover_from_panic(&self, trigger: Option<i64>) {
        error!(room_id = self.room_id, trigger = ?trigger, "Generation task panicked");
        self.sink
            .emit(ObserverEvent::error("Generation failed: task panicked"));
        self.state.lock().await.is_generating = false;
    }

    async fn run_pipeline(&self, context: Arc<[Message]>, trigger: Option<i64>) {
        self.sink.emit(ObserverEvent::status(StatusPhase::GenerationStart {
            trigger_message_id: trigger,
        }));

        let produced = match self.generate(&context, trigger).await {
            Err(e) => {
                warn!(room_id = self.room_id, trigger = ?trigger, error = %e, "Generation failed");
                self.sink.emit(ObserverEvent::error(format!("Generation failed: {e}")));
                false
            }
            Ok(result) if result.is_blank() => {
                warn!(room_id = self.room_id, trigger = ?trigger, "Generation returned blank content");
                self.sink
                    .emit(ObserverEvent::error("Generation returned empty content"));
                false
            }
            Ok(result) => {
                info!(
                    room_id = self.room_id,
                    trigger = ?trigger,
                    model = %result.model_id,
                    chars = result.content.chars().count(),
                    "Generation completed"
                );
                self.sink.emit(ObserverEvent::status(StatusPhase::GenerationDone {
                    content: result.content.clone(),
                    model: result.model_id.clone(),
                    mode: result.mode,
                }));
                self.export_result(result, trigger).await;
                true
            }
        };

        let mut state = self.state.lock().await;
        state.is_generating = false;
        if produced {
            state.last_generation_completed_at = Some(self.clock.now());
        }
    }

    async fn generate(&self, context: &[Message], trigger: Option<i64>) -> Result<GenerationResult, GenerationError> {
        let messages = narrow_context(context, trigger, self.settings.context_limit)?;
        let request = GenerationRequest {
            room_id: self.room_id,
            messages,
            mode: self.settings.mode,
            trigger_message_id: trigger,
        };
        self.generator.generate(&request).await
    }

    async fn export_result(&self, result: GenerationResult, trigger: Option<i64>) {
        if !self.settings.export_on_generate {
            return;
        }
        let Some(export) = self.export.as_ref().filter(|e| e.is_configured()) else {
            self.sink
                .debug("export skipped: no template configured".to_string());
            return;
        };

        self.sink.emit(ObserverEvent::status(StatusPhase::ExportStart));
        let request = ExportRequest {
            content: result.content,
            context_messages: result.context_messages,
            trigger_message_id: trigger,
        };

        match export.export(&request).await {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    self.sink.debug(format!("export warning: {warning}"));
                }
                self.sink.emit(ObserverEvent::status(StatusPhase::ExportDone {
                    document_id: outcome.document_id,
                    document_url: outcome.document_url,
                }));
            }
            Err(e) => {
                warn!(room_id = self.room_id, trigger = ?trigger, error = %e, "Export failed");
                self.sink.emit(ObserverEvent::error(format!("Export failed: {e}")));
            }
        }
    }
}

/// Context for one generation
///
/// With a trigger, exactly that message; without one, the latest `limit`
/// messages of the snapshot.
pub fn narrow_context(snapshot: &[Message], trigger: Option<i64>, limit: usize) -> Result<Vec<Message>, GenerationError> {
    match trigger {
        Some(id) => snapshot
            .iter()
            .find(|m| m.id == id)
            .map(|m| vec![m.clone()])
            .ok_or_else(|| GenerationError::Context(format!("trigger message {id} not found in snapshot"))),
        None => {
            let start = snapshot.len().saturating_sub(limit);
            Ok(snapshot[start..].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::monitor::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<ObserverEvent>>,
    }

    impl RecordingSink {
        fn phases(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| e.phase_name())
                .collect()
        }

        fn errors(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ObserverEvent::Error { message } => Some(message.clone()),
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

    #[derive(Default)]
    struct FakeGenerator {
        requests: StdMutex<Vec<GenerationRequest>>,
        reply: String,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    impl FakeGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Self::default()
            }
        }

        fn triggers(&self) -> Vec<Option<i64>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.trigger_message_id)
                .collect()
        }
    }

    #[async_trait]
    impl ScriptGenerator for FakeGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(GenerationError::Network("connection reset".to_string()));
            }
            Ok(GenerationResult {
                content: self.reply.clone(),
                model_id: "fake-model".to_string(),
                mode: request.mode,
                context_messages: request.messages.clone(),
            })
        }
    }

    struct Harness {
        scheduler: GenerationScheduler,
        generator: Arc<FakeGenerator>,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn harness(generator: FakeGenerator, export: Option<Arc<ExportPipeline>>, export_on_generate: bool) -> Harness {
        let generator = Arc::new(generator);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let scheduler = GenerationScheduler::new(
            7,
            Arc::new(Mutex::new(RoomState::new())),
            generator.clone(),
            export,
            sink.clone(),
            clock.clone(),
            SchedulerSettings {
                mode: GenerationMode::Direct,
                export_on_generate,
                context_limit: 2,
            },
        );
        Harness {
            scheduler,
            generator,
            sink,
            clock,
        }
    }

    fn snapshot(ids: &[i64]) -> Arc<[Message]> {
        ids.iter()
            .map(|id| Message::new(*id, "客", format!("message {id}")))
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn test_cooldown_queues_then_drain_replays() {
        let h = harness(FakeGenerator::replying("プロット①"), None, false);
        h.scheduler.state().lock().await.last_generation_completed_at = Some(t0());

        h.clock.advance(chrono::Duration::minutes(2));
        let outcome = h.scheduler.request_generation(snapshot(&[9, 10]), Some(10)).await;
        match outcome {
            RequestOutcome::Queued { eligible_at } => {
                assert_eq!(eligible_at, t0() + chrono::Duration::minutes(5))
            }
            other => panic!("expected queued, got {other:?}"),
        }
        assert!(h.generator.triggers().is_empty());

        h.clock.advance(chrono::Duration::minutes(4));
        let outcomes = h.scheduler.drain_queue(snapshot(&[9, 10, 11])).await;
        assert_eq!(outcomes.len(), 1);
        for outcome in outcomes {
            outcome.finished().await;
        }

        assert_eq!(h.generator.triggers(), vec![Some(10)]);
        let state = h.scheduler.state().lock().await;
        assert!(state.pending().is_empty());
        assert_eq!(
            state.last_generation_completed_at,
            Some(t0() + chrono::Duration::minutes(6))
        );
    }

    #[tokio::test]
    async fn test_request_at_interval_boundary_runs() {
        let h = harness(FakeGenerator::replying("ok"), None, false);
        h.scheduler.state().lock().await.last_generation_completed_at = Some(t0());
        h.clock.advance(chrono::Duration::minutes(5));

        let outcome = h.scheduler.request_generation(snapshot(&[1]), Some(1)).await;
        assert!(outcome.is_started());
        outcome.finished().await;
        assert_eq!(h.generator.triggers(), vec![Some(1)]);
    }

    #[tokio::test]
    async fn test_duplicate_trigger_is_queued_once() {
        let h = harness(FakeGenerator::replying("ok"), None, false);
        h.scheduler.state().lock().await.last_generation_completed_at = Some(t0());

        let first = h.scheduler.request_generation(snapshot(&[3]), Some(3)).await;
        let second = h.scheduler.request_generation(snapshot(&[3]), Some(3)).await;
        assert!(matches!(first, RequestOutcome::Queued { .. }));
        assert!(matches!(second, RequestOutcome::AlreadyQueued));
        assert_eq!(h.scheduler.state().lock().await.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_untriggered_request_during_cooldown_is_skipped() {
        let h = harness(FakeGenerator::replying("ok"), None, false);
        h.scheduler.state().lock().await.last_generation_completed_at = Some(t0());

        let outcome = h.scheduler.request_generation(snapshot(&[3]), None).await;
        assert!(matches!(outcome, RequestOutcome::Skipped));
        assert!(h.scheduler.state().lock().await.pending().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_generation_drops_requests() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            FakeGenerator {
                reply: "ok".to_string(),
                gate: Some(gate.clone()),
                ..FakeGenerator::default()
            },
            None,
            false,
        );

        let running = h.scheduler.request_generation(snapshot(&[1, 2]), Some(1)).await;
        assert!(running.is_started());
        let dropped = h.scheduler.request_generation(snapshot(&[1, 2]), Some(2)).await;
        assert!(matches!(dropped, RequestOutcome::Dropped));
        assert!(h.scheduler.drain_queue(snapshot(&[1, 2])).await.is_empty());

        gate.notify_one();
        running.finished().await;
        assert_eq!(h.generator.triggers(), vec![Some(1)]);
        assert!(!h.scheduler.state().lock().await.is_generating);
    }

    #[tokio::test]
    async fn test_failed_generation_does_not_start_cooldown() {
        let h = harness(
            FakeGenerator {
                fail: true,
                ..FakeGenerator::default()
            },
            None,
            false,
        );

        h.scheduler.request_generation(snapshot(&[1]), Some(1)).await.finished().await;

        assert_eq!(h.sink.phases(), vec!["generation_start"]);
        assert_eq!(h.sink.errors().len(), 1);
        let state = h.scheduler.state().lock().await;
        assert!(state.last_generation_completed_at.is_none());
        assert!(!state.is_generating);
    }

    #[tokio::test]
    async fn test_blank_generation_is_a_failure() {
        let h = harness(FakeGenerator::replying("  \n "), None, false);
        h.scheduler.request_generation(snapshot(&[1]), Some(1)).await.finished().await;

        assert_eq!(h.sink.errors(), vec!["Generation returned empty content".to_string()]);
        assert!(h.scheduler.state().lock().await.last_generation_completed_at.is_none());

        let again = h.scheduler.request_generation(snapshot(&[1, 2]), Some(2)).await;
        assert!(again.is_started());
        again.finished().await;
    }

    #[tokio::test]
    async fn test_missing_trigger_message_fails_generation() {
        let h = harness(FakeGenerator::replying("ok"), None, false);
        h.scheduler.request_generation(snapshot(&[1, 2]), Some(99)).await.finished().await;

        assert!(h.generator.triggers().is_empty());
        assert_eq!(h.sink.errors().len(), 1);
        assert!(h.sink.errors()[0].contains("99"));
    }

    #[tokio::test]
    async fn test_export_failure_keeps_generation_result() {
        let export = Arc::new(ExportPipeline::new(
            None,
            ExportConfig {
                template_file_id: Some("tmpl".to_string()),
                ..ExportConfig::default()
            },
        ));
        let h = harness(FakeGenerator::replying("プロット①"), Some(export), true);

        h.scheduler.request_generation(snapshot(&[1]), Some(1)).await.finished().await;

        assert_eq!(
            h.sink.phases(),
            vec!["generation_start", "generation_done", "export_start"]
        );
        assert_eq!(h.sink.errors().len(), 1);
        assert!(h.sink.errors()[0].starts_with("Export failed"));
        assert!(h.scheduler.state().lock().await.last_generation_completed_at.is_some());
    }

    #[tokio::test]
    async fn test_untriggered_context_is_latest_messages() {
        let h = harness(FakeGenerator::replying("ok"), None, false);
        h.scheduler.request_generation(snapshot(&[1, 2, 3]), None).await.finished().await;

        let requests = h.generator.requests.lock().unwrap();
        let ids: Vec<i64> = requests[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(requests[0].mode, GenerationMode::Direct);
    }

    #[tokio::test]
    async fn test_drain_requeues_remaining_entries_after_start() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            FakeGenerator {
                reply: "ok".to_string(),
                gate: Some(gate.clone()),
                ..FakeGenerator::default()
            },
            None,
            false,
        );
        {
            let mut state = h.scheduler.state().lock().await;
            state.last_generation_completed_at = Some(t0());
            state.enqueue(4, t0() + chrono::Duration::minutes(5));
            state.enqueue(5, t0() + chrono::Duration::minutes(5));
        }
        h.clock.advance(chrono::Duration::minutes(5));

        let mut outcomes = h.scheduler.drain_queue(snapshot(&[4, 5])).await;
        assert_eq!(outcomes.len(), 1);
        let pending: Vec<i64> = h
            .scheduler
            .state()
            .lock()
            .await
            .pending()
            .iter()
            .map(|e| e.trigger_message_id)
            .collect();
        assert_eq!(pending, vec![5]);

        gate.notify_one();
        outcomes.remove(0).finished().await;
        assert_eq!(h.generator.triggers(), vec![Some(4)]);
    }

    #[test]
    fn test_narrow_context() {
        let messages: Vec<Message> = (1..=60).map(|id| Message::new(id, "a", "b")).collect();

        let latest = narrow_context(&messages, None, DEFAULT_CONTEXT_LIMIT).unwrap();
        assert_eq!(latest.len(), 50);
        assert_eq!(latest[0].id, 11);

        let single = narrow_context(&messages, Some(30), DEFAULT_CONTEXT_LIMIT).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].id, 30);

        assert!(matches!(
            narrow_context(&messages, Some(999), DEFAULT_CONTEXT_LIMIT),
            Err(GenerationError::Context(_))
        ));
    }
}
