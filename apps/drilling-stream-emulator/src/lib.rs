#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Drilling Stream Emulator - Tabular Data Broadcaster
//!
//! An SSE service that loads a table of numeric drilling measurements from a
//! Notion data source and replays it, one row per tick, to every connected
//! streaming client. When the end of the table is reached it wraps around.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Records, wire frames and the cyclic cursor
//!   - `record`: Validated numeric rows
//!   - `envelope`: Data envelopes and error frames
//!   - `cursor`: Wrap-around read position
//!
//! - **Application**: Ports and services
//!   - `ports`: `RecordSource` and `ClientSink` contracts
//!   - `services`: `DataSource`, the cached table with its cursor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broadcast`: Client registry and periodic fan-out
//!   - `notion`: Notion query client and load retry
//!   - `sse`: Stream, status and refresh endpoints
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────┐  next()  ┌───────────────────┐
//! Notion API ─────►│ DataSource │◄─────────│ BroadcastRegistry │──► Client 1
//!   (refresh)      └────────────┘   tick   │  (interval loop)  │──► Client 2
//!                                          └───────────────────┘──► Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core record types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cursor::RecordCursor;
pub use domain::envelope::{Envelope, ErrorFrame, Frame, SCHEMA_VERSION};
pub use domain::record::{Record, RecordError};

// Ports and services
pub use application::ports::{ClientSink, RecordSource, SendError, SourceError};
pub use application::services::{DataInfo, DataSource};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, EmulatorConfig, LoadRetrySettings, NotionSettings,
    ServerSettings,
};

// Broadcast registry
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastError, BroadcastRegistry, ClientInfo, ConnectionId,
    DeliveryReport, RegistryStatus, SharedBroadcastRegistry, TickReport,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// SSE server
pub use infrastructure::sse::{ChannelSink, StreamServer, StreamServerError, StreamState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
