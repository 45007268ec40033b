//! roomscribe - chat room monitor and sales script generator
//!
//! Serves observer SSE streams on top of periodically polled chat rooms,
//! generates scripts for new sales requests and exports them to copies of a
//! spreadsheet template.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomscribe::config::AppConfig;
use roomscribe::monitor::SystemClock;
use roomscribe::services::{
    ExportPipeline, GoogleSheetsClient, MembersClient, OpenAiScriptGenerator, ServiceAccountAuth,
    ServiceAccountKey, SpreadsheetApi,
};
use roomscribe::AppState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "roomscribe")]
#[command(about = "Chat room monitor with AI sales script generation")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "ROOMSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Override bind address (e.g. 0.0.0.0:5780)
    #[arg(short, long, env = "ROOMSCRIBE_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting roomscribe");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let source = MembersClient::new(&config.members).context("Failed to build chat client")?;
    let generator =
        OpenAiScriptGenerator::new(&config.generation).context("Failed to build generation client")?;

    let sheets: Option<Arc<dyn SpreadsheetApi>> = match ServiceAccountKey::from_config(&config.export) {
        Ok(Some(key)) => {
            let http_client = GoogleSheetsClient::default_http_client()?;
            let auth = ServiceAccountAuth::new(http_client.clone(), key)?;
            let client = GoogleSheetsClient::new(http_client, Arc::new(auth));
            Some(Arc::new(client) as Arc<dyn SpreadsheetApi>)
        }
        Ok(None) => {
            warn!("No spreadsheet credentials configured, export disabled");
            None
        }
        Err(e) => {
            warn!(error = %e, "Spreadsheet credentials unusable, export disabled");
            None
        }
    };
    let export = Arc::new(ExportPipeline::new(sheets, config.export.clone()));

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let state = AppState::new(
        config,
        Arc::new(source),
        Arc::new(generator),
        export.clone(),
        Arc::new(SystemClock),
    );
    let shutdown = state.shutdown.clone();
    let app = roomscribe::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Observer streams never end on their own
            shutdown.cancel();
        })
        .await?;

    info!("Waiting for export side tasks");
    export.wait_for_side_tasks().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
