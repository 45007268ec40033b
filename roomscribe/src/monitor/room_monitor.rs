//! Room monitor: one poll tick of a monitored room
//!
//! Each tick fetches the full message snapshot (the source has no cursor),
//! classifies messages against the high-water mark and hands new ones to the
//! [`GenerationScheduler`]. "New" is decided purely by id: anything at or
//! below the high-water mark is never reconsidered, even if it shows up late.

use roomscribe_common::message::max_id;
use roomscribe_common::{Message, ObserverEvent, StatusPhase};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::monitor::room_state::RoomState;
use crate::monitor::scheduler::{GenerationScheduler, RequestOutcome};
use crate::monitor::sink::EventSink;
use crate::services::MessageSource;

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    /// Messages classified as new, ascending by id
    pub new_messages: Vec<Message>,
    /// Outcomes of generation requests made during the tick (including drains)
    pub requests: Vec<RequestOutcome>,
    /// Fetch failure, if the tick ended early
    pub error: Option<String>,
}

impl TickReport {
    /// Wait for every generation started during the tick
    pub async fn wait_for_generations(self) {
        for outcome in self.requests {
            outcome.finished().await;
        }
    }
}

pub struct RoomMonitor {
    room_id: i64,
    state: Arc<Mutex<RoomState>>,
    source: Arc<dyn MessageSource>,
    scheduler: GenerationScheduler,
    sink: Arc<dyn EventSink>,
    generate_on_connect: bool,
}

impl RoomMonitor {
    pub fn new(
        room_id: i64,
        source: Arc<dyn MessageSource>,
        scheduler: GenerationScheduler,
        sink: Arc<dyn EventSink>,
        generate_on_connect: bool,
    ) -> Self {
        Self {
            room_id,
            state: scheduler.state().clone(),
            source,
            scheduler,
            sink,
            generate_on_connect,
        }
    }

    pub fn state(&self) -> &Arc<Mutex<RoomState>> {
        &self.state
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        self.sink.debug(format!("polling room {}", self.room_id));

        let mut snapshot = match self.source.fetch_messages(self.room_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room_id = self.room_id, error = %e, "Message fetch failed");
                let message = format!("Failed to fetch messages: {e}");
                self.sink.emit(ObserverEvent::error(message.clone()));
                report.error = Some(message);
                return report;
            }
        };
        snapshot.sort_by_key(|m| m.id);

        if !snapshot.is_empty() {
            self.sink.emit(ObserverEvent::Messages {
                messages: snapshot.clone(),
            });
        }
        let snapshot: Arc<[Message]> = snapshot.into();

        if !snapshot.is_empty() {
            let first_poll = {
                let mut state = self.state.lock().await;
                std::mem::replace(&mut state.is_first_poll, false)
            };

            if first_poll {
                self.establish_baseline(&snapshot, &mut report).await;
            } else {
                self.process_new(&snapshot, &mut report).await;
            }
        }

        report
            .requests
            .extend(self.scheduler.drain_queue(snapshot).await);
        report
    }

    async fn establish_baseline(&self, snapshot: &Arc<[Message]>, report: &mut TickReport) {
        let baseline = max_id(snapshot);
        if let Some(id) = baseline {
            self.state.lock().await.advance_to(id);
        }
        info!(room_id = self.room_id, baseline = ?baseline, messages = snapshot.len(), "Baseline established");
        self.sink
            .debug(format!("baseline established at message {baseline:?}"));

        if self.generate_on_connect {
            report
                .requests
                .push(self.scheduler.request_generation(snapshot.clone(), None).await);
        }
    }

    async fn process_new(&self, snapshot: &Arc<[Message]>, report: &mut TickReport) {
        let unprocessed: Vec<Message> = {
            let state = self.state.lock().await;
            snapshot
                .iter()
                .filter(|m| state.is_unseen(m.id))
                .cloned()
                .collect()
        };
        if unprocessed.is_empty() {
            return;
        }

        info!(
            room_id = self.room_id,
            count = unprocessed.len(),
            first = unprocessed[0].id,
            "New messages detected"
        );
        self.sink.emit(ObserverEvent::status(StatusPhase::PollOk));

        for message in &unprocessed {
            let outcome = self
                .scheduler
                .request_generation(snapshot.clone(), Some(message.id))
                .await;
            debug!(room_id = self.room_id, trigger = message.id, outcome = ?outcome, "Generation requested");
            report.requests.push(outcome);
            self.state.lock().await.advance_to(message.id);
        }
        report.new_messages = unprocessed;
    }
}
