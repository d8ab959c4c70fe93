//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RecordSource`: Fetches the full record table from the upstream store
//! - `ClientSink`: Write capability for one connected streaming client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::record::Record;

// =============================================================================
// Record Source
// =============================================================================

/// Errors raised by the data source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The upstream store could not be queried (transport, auth, decode).
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The upstream query succeeded but returned no rows.
    #[error("data source returned no records")]
    Empty,

    /// No load has completed yet.
    #[error("no records loaded yet")]
    NotLoaded,
}

/// Upstream store that can produce the whole record table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record, in replay order.
    async fn fetch_all(&self) -> Result<Vec<Record>, SourceError>;
}

// =============================================================================
// Client Sink
// =============================================================================

/// Reasons a write to one client's sink failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The client's channel is gone.
    #[error("client sink closed")]
    Closed,

    /// The write did not complete within the per-client deadline.
    #[error("client send timed out after {0:?}")]
    TimedOut(Duration),

    /// The sink refused the frame.
    #[error("client sink rejected frame: {0}")]
    Rejected(String),
}

impl SendError {
    /// Short label used in metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::TimedOut(_) => "timeout",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Opaque write capability for one streaming client.
///
/// `payload` is the frame already serialized to JSON; the transport applies
/// its own framing.
#[async_trait]
pub trait ClientSink: Send + Sync {
    /// Deliver one frame.
    async fn send(&self, payload: Arc<str>) -> Result<(), SendError>;
}
