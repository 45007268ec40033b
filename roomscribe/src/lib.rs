//! roomscribe library interface
//!
//! Watches chat rooms, turns new sales requests into generated call scripts
//! and exports them to templated spreadsheets. Exposed as a library so the
//! router and the monitoring core can be driven from integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod monitor;
pub mod services;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::monitor::Clock;
use crate::services::{ExportPipeline, MessageSource, ScriptGenerator};
use crate::session::SessionDeps;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub source: Arc<dyn MessageSource>,
    pub export: Arc<ExportPipeline>,
    /// Collaborators handed to every monitoring session
    pub session_deps: SessionDeps,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Cancelled on server shutdown; ends every open observer stream
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        source: Arc<dyn MessageSource>,
        generator: Arc<dyn ScriptGenerator>,
        export: Arc<ExportPipeline>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_deps = SessionDeps {
            source: source.clone(),
            generator,
            export: Some(export.clone()),
            clock,
            context_limit: config.generation.context_limit,
            heartbeat: config.monitor.heartbeat(),
            event_buffer: config.monitor.event_buffer,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        };

        Self {
            config: Arc::new(config),
            source,
            export,
            session_deps,
            startup_time: Utc::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of observer connections currently monitoring a room
    pub fn live_sessions(&self) -> usize {
        self.session_deps.active_sessions.load(Ordering::SeqCst)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::room_routes())
        .merge(api::export_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
