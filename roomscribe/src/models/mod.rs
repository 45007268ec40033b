//! Data models for generation and export

pub mod export;
pub mod generation;

pub use export::{ExportFields, ExportOutcome, ExportRequest};
pub use generation::{GenerationRequest, GenerationResult};
