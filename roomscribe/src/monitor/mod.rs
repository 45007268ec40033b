//! Polling and generation orchestration core
//!
//! - [`room_state`]: per-room high-water mark, single-flight flag, cooldown
//!   timestamp and pending queue
//! - [`room_monitor`]: one poll tick (fetch, classify, request, drain)
//! - [`scheduler`]: run-or-queue decisions and the generation + export pipeline
//! - [`sink`]: observer event delivery

pub mod clock;
pub mod room_monitor;
pub mod room_state;
pub mod scheduler;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use room_monitor::{RoomMonitor, TickReport};
pub use room_state::{PendingEntry, RoomState};
pub use scheduler::{GenerationScheduler, RequestOutcome, SchedulerSettings, MIN_GENERATION_INTERVAL};
pub use sink::{EventSink, SessionBroadcaster};
