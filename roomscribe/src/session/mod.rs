//! Monitoring session runtime
//!
//! One session per observer connection. Starting a session emits `hello` and
//! spawns two tasks under a shared [`CancellationToken`]:
//! - the poll loop, ticking the [`RoomMonitor`] every `interval`
//! - the heartbeat, emitting `ping` on a fixed cadence
//!
//! Dropping the [`MonitorSession`] cancels both and closes the broadcaster.
//! Generation tasks already running finish on their own; their events are
//! discarded. Detached export side tasks are not affected.

use roomscribe_common::{EventRecord, GenerationMode, ObserverEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::monitor::{
    Clock, EventSink, GenerationScheduler, RoomMonitor, RoomState, SchedulerSettings, SessionBroadcaster,
};
use crate::services::{ExportPipeline, MessageSource, ScriptGenerator};

/// Observer-supplied session parameters
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub room_id: i64,
    pub interval: Duration,
    pub generate_on_connect: bool,
    pub export_on_generate: bool,
    pub debug: bool,
    pub mode: GenerationMode,
    /// Resume from this high-water mark instead of establishing a baseline
    pub resume_from: Option<i64>,
}

/// Shared collaborators every session is built from
#[derive(Clone)]
pub struct SessionDeps {
    pub source: Arc<dyn MessageSource>,
    pub generator: Arc<dyn ScriptGenerator>,
    pub export: Option<Arc<ExportPipeline>>,
    pub clock: Arc<dyn Clock>,
    pub context_limit: usize,
    pub heartbeat: Duration,
    pub event_buffer: usize,
    /// Live session counter (reported by `/health`)
    pub active_sessions: Arc<AtomicUsize>,
}

pub struct MonitorSession {
    id: Uuid,
    room_id: i64,
    token: CancellationToken,
    broadcaster: Arc<SessionBroadcaster>,
    active_sessions: Arc<AtomicUsize>,
}

impl MonitorSession {
    /// Start polling; the receiver yields the session's event records
    pub fn start(params: SessionParams, deps: &SessionDeps) -> (Self, mpsc::Receiver<EventRecord>) {
        let id = Uuid::new_v4();
        let (broadcaster, rx) = SessionBroadcaster::channel(deps.event_buffer, params.debug);
        let broadcaster = Arc::new(broadcaster);
        let sink: Arc<dyn EventSink> = broadcaster.clone();

        let state = match params.resume_from {
            Some(last_id) => RoomState::resuming_from(last_id),
            None => RoomState::new(),
        };

        let scheduler = GenerationScheduler::new(
            params.room_id,
            Arc::new(Mutex::new(state)),
            deps.generator.clone(),
            deps.export.clone(),
            sink.clone(),
            deps.clock.clone(),
            SchedulerSettings {
                mode: params.mode,
                export_on_generate: params.export_on_generate,
                context_limit: deps.context_limit,
            },
        );
        let monitor = RoomMonitor::new(
            params.room_id,
            deps.source.clone(),
            scheduler,
            sink.clone(),
            params.generate_on_connect,
        );

        sink.emit(ObserverEvent::Hello {
            room_id: params.room_id,
            interval_ms: params.interval.as_millis() as u64,
        });

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(monitor, params.interval, token.clone()));
        tokio::spawn(heartbeat_loop(sink, deps.heartbeat, token.clone()));

        let live = deps.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            session_id = %id,
            room_id = params.room_id,
            interval_ms = params.interval.as_millis() as u64,
            generate_on_connect = params.generate_on_connect,
            export_on_generate = params.export_on_generate,
            mode = params.mode.as_str(),
            resume_from = ?params.resume_from,
            live_sessions = live,
            "Monitoring session started"
        );

        let session = Self {
            id,
            room_id: params.room_id,
            token,
            broadcaster,
            active_sessions: deps.active_sessions.clone(),
        };
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel timers and stop event delivery
    pub fn shutdown(&self) {
        self.token.cancel();
        self.broadcaster.close();
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.shutdown();
        let live = self.active_sessions.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!(session_id = %self.id, room_id = self.room_id, live_sessions = live, "Monitoring session closed");
    }
}

async fn poll_loop(monitor: RoomMonitor, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            report = monitor.tick() => {
                if let Some(error) = &report.error {
                    debug!(error = %error, "Poll tick ended early");
                }
            }
        }
    }
    debug!("Poll loop stopped");
}

async fn heartbeat_loop(sink: Arc<dyn EventSink>, every: Duration, token: CancellationToken) {
    let every = every.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                sink.emit(ObserverEvent::Ping {
                    timestamp: roomscribe_common::time::now_millis(),
                });
            }
        }
    }
    debug!("Heartbeat stopped");
}
