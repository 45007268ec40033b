//! # Roomscribe Common Library
//!
//! Shared code for the roomscribe service and its tests:
//! - Chat message model as seen by the monitor
//! - Observer event types (`ObserverEvent`, `EventRecord`)
//! - Configuration file discovery and loading
//! - Error type
//! - Time formatting helpers

pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventRecord, GenerationMode, ObserverEvent, StatusPhase};
pub use message::{Author, Message};
