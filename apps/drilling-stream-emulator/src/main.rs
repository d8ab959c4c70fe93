//! Drilling Stream Emulator Binary
//!
//! Starts the SSE broadcaster.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin drilling-stream-emulator
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `NOTION_API_KEY`: Notion integration token
//! - `NOTION_DATABASE_ID`: Notion data source id
//! - `SSE_INTERVAL`: Broadcast interval in milliseconds
//! - `PORT`: SSE HTTP port
//!
//! ## Optional
//! - `HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `NOTION_API_URL`, `NOTION_VERSION`, `NOTION_SORT_PROPERTY`,
//!   `NOTION_PAGE_SIZE`, `NOTION_TIMEOUT_SECS`: Notion query tuning
//! - `SSE_SEND_TIMEOUT_MS`: Per-client write deadline (default: 1000)
//! - `SSE_CLIENT_BUFFER`: Frames buffered per client (default: 64)
//! - `NOTION_LOAD_RETRY_INITIAL_MS`, `NOTION_LOAD_RETRY_MAX_SECS`,
//!   `NOTION_LOAD_MAX_ATTEMPTS`: Startup load backoff
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: drilling-stream-emulator)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use drilling_stream_emulator::application::services::DataSource;
use drilling_stream_emulator::infrastructure::broadcast::{BroadcastConfig, BroadcastRegistry};
use drilling_stream_emulator::infrastructure::health::{HealthServer, HealthServerState};
use drilling_stream_emulator::infrastructure::notion::{
    NotionConfig, NotionRecordSource, RetryConfig, RetryPolicy, load_with_retry,
};
use drilling_stream_emulator::infrastructure::sse::{StreamServer, StreamState};
use drilling_stream_emulator::infrastructure::telemetry;
use drilling_stream_emulator::{EmulatorConfig, init_metrics};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Drilling Stream Emulator");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = EmulatorConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Data source backed by Notion
    let notion = NotionRecordSource::new(NotionConfig::from(&config.notion))?;
    let data_source = Arc::new(DataSource::new(Arc::new(notion)));

    // Broadcast registry
    let registry = Arc::new(BroadcastRegistry::new(
        BroadcastConfig::from(config.broadcast.clone()),
        Arc::clone(&data_source),
        shutdown_token.clone(),
    ));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Initial load in the background; ticks before it completes send nothing
    let load_source = Arc::clone(&data_source);
    let load_policy = RetryPolicy::new(RetryConfig::from(&config.load_retry));
    let load_cancel = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        match load_with_retry(&load_source, load_policy, &load_cancel).await {
            Ok(total) => tracing::info!(records = total, "Initial load complete"),
            Err(e) => tracing::warn!(
                error = %e,
                "Initial load failed, clients will receive error frames until a refresh succeeds"
            ),
        }
    }));

    // Broadcast loop
    let loop_registry = Arc::clone(&registry);
    tasks.push(tokio::spawn(async move {
        if let Err(e) = loop_registry.run().await {
            tracing::error!(error = %e, "Broadcast loop error");
        }
    }));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    // SSE server
    let stream_state = Arc::new(StreamState::new(
        Arc::clone(&registry),
        config.broadcast.client_buffer,
    ));
    let stream_server = StreamServer::new(config.server.port, stream_state, shutdown_token.clone());
    tasks.push(tokio::spawn(async move {
        if let Err(e) = stream_server.run().await {
            tracing::error!(error = %e, "SSE server error");
        }
    }));

    tracing::info!("Drilling stream emulator ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting with tasks still running"
        );
    }

    tracing::info!("Drilling stream emulator stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EmulatorConfig) {
    tracing::info!(
        port = config.server.port,
        health_port = config.server.health_port,
        interval_ms = config.broadcast.interval.as_millis(),
        send_timeout_ms = config.broadcast.send_timeout.as_millis(),
        client_buffer = config.broadcast.client_buffer,
        "Configuration loaded"
    );
    tracing::debug!(
        api_url = %config.notion.api_url,
        api_version = %config.notion.api_version,
        data_source_id = %config.notion.data_source_id,
        sort_property = ?config.notion.sort_property,
        "Notion data source"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
