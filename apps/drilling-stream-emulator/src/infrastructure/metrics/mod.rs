//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Broadcast cycles by outcome and their duration
//! - **Frames**: Frames delivered to clients by kind
//! - **Clients**: Connected client gauge and send failures by reason
//! - **Refreshes**: Data source reloads by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "drilling_emulator_ticks_total",
        "Broadcast ticks by outcome"
    );
    describe_histogram!(
        "drilling_emulator_tick_duration_seconds",
        "Time to build and deliver one tick"
    );
    describe_counter!(
        "drilling_emulator_frames_sent_total",
        "Frames delivered to streaming clients"
    );
    describe_counter!(
        "drilling_emulator_send_failures_total",
        "Client writes that failed and dropped the client"
    );
    describe_gauge!(
        "drilling_emulator_clients",
        "Number of registered streaming clients"
    );
    describe_counter!(
        "drilling_emulator_refreshes_total",
        "Data source reloads by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A data envelope was broadcast.
    Data,
    /// An error frame was broadcast.
    Error,
    /// No clients were registered.
    Idle,
    /// No records are loaded yet.
    NoData,
    /// Another tick was still in flight.
    Skipped,
}

impl TickOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Error => "error",
            Self::Idle => "idle",
            Self::NoData => "no_data",
            Self::Skipped => "skipped",
        }
    }
}

/// Frame kind label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Data envelope.
    Data,
    /// Error frame.
    Error,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Error => "error",
        }
    }
}

/// Record a completed tick.
pub fn record_tick(outcome: TickOutcome) {
    counter!(
        "drilling_emulator_ticks_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record how long a tick took.
pub fn record_tick_duration(duration: Duration) {
    histogram!("drilling_emulator_tick_duration_seconds").record(duration.as_secs_f64());
}

/// Record frames delivered in one tick.
pub fn record_frames_sent(kind: FrameKind, count: u64) {
    counter!(
        "drilling_emulator_frames_sent_total",
        "kind" => kind.as_str()
    )
    .increment(count);
}

/// Record a failed client write.
pub fn record_send_failure(reason: &'static str) {
    counter!(
        "drilling_emulator_send_failures_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the registered client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_clients(count: usize) {
    gauge!("drilling_emulator_clients").set(count as f64);
}

/// Record a data source refresh.
pub fn record_refresh(success: bool) {
    counter!(
        "drilling_emulator_refreshes_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
