//! Event delivery to the observer of one monitoring session
//!
//! The broadcaster never blocks and never fails: once the observer is gone
//! (or the session was closed) every emit is a silent no-op, so generation
//! tasks that outlive their session can keep reporting without effect.

use roomscribe_common::{EventRecord, ObserverEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Destination for observer events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ObserverEvent);

    /// Whether the observer asked for diagnostic events
    fn debug_enabled(&self) -> bool;

    /// Emit a `debug` event if the observer asked for them
    fn debug(&self, message: String) {
        if self.debug_enabled() {
            self.emit(ObserverEvent::debug(message));
        }
    }
}

/// Per-session broadcaster stamping events with sequence number and time
pub struct SessionBroadcaster {
    tx: mpsc::Sender<EventRecord>,
    seq: AtomicU64,
    closed: AtomicBool,
    debug: bool,
}

impl SessionBroadcaster {
    /// Broadcaster plus the receiving end consumed by the transport
    pub fn channel(capacity: usize, debug: bool) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let broadcaster = Self {
            tx,
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            debug,
        };
        (broadcaster, rx)
    }

    /// Stop delivering; later emits are no-ops
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

impl EventSink for SessionBroadcaster {
    fn emit(&self, event: ObserverEvent) {
        if self.is_closed() {
            trace!(event_type = event.event_type(), "Session closed, event discarded");
            return;
        }

        let record = EventRecord {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: roomscribe_common::time::now(),
            event,
        };

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                warn!(
                    seq = record.seq,
                    event_type = record.event.event_type(),
                    "Observer is not keeping up, event dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.close(),
        }
    }

    fn debug_enabled(&self) -> bool {
        self.debug
    }
}
