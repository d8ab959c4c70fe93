//! Broadcast Registry
//!
//! Owns the set of connected streaming clients and the periodic loop that
//! pulls one record per tick from the [`DataSource`] and fans it out.
//!
//! # Architecture
//!
//! - Client handles live in a single `RwLock<HashMap>`; register, unregister
//!   and the snapshot phase of a tick take it briefly and never across an
//!   await point.
//! - A tick serializes its frame once, snapshots the sinks, releases the lock
//!   and then writes to every sink concurrently. Each write is bounded by
//!   `send_timeout`; any failure drops that one client and nothing else.
//! - Ticks never overlap: the loop is a single task with skip-on-miss
//!   interval semantics, and a tick requested while another is in flight is
//!   skipped.
//!
//! Registration is last-register-wins. Every registration gets a fresh
//! [`ConnectionId`] so that the transport's disconnect path can remove its
//! own connection without evicting a newer one under the same client id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ClientSink, SendError, SourceError};
use crate::application::services::DataSource;
use crate::domain::envelope::{Envelope, ErrorFrame, Frame};
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics::{self, FrameKind, TickOutcome};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the broadcast loop.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Tick interval. Must be non-zero.
    pub interval: Duration,
    /// Deadline for a single client write.
    pub send_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            interval: settings.interval,
            send_timeout: settings.send_timeout,
        }
    }
}

// =============================================================================
// Client Handles
// =============================================================================

/// Identifies one registration of a client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

struct ClientHandle {
    connection: ConnectionId,
    sink: Arc<dyn ClientSink>,
    connected_at: DateTime<Utc>,
}

/// Status entry for one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client id.
    pub id: String,
    /// When the current registration was made.
    pub connected_at: DateTime<Utc>,
    /// Milliseconds since `connected_at`.
    pub duration_ms: i64,
}

/// Point-in-time registry status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    /// Number of registered clients.
    pub clients_count: usize,
    /// Tick interval in milliseconds.
    pub interval_ms: u64,
    /// Whether the broadcast loop is running.
    pub is_active: bool,
    /// Registered clients, oldest first.
    pub clients: Vec<ClientInfo>,
}

// =============================================================================
// Reports
// =============================================================================

/// Result of fanning one frame out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sends attempted (one per registered client in the snapshot).
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Client ids dropped because their send failed.
    pub dropped: Vec<String>,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// No clients registered; the data source was not touched.
    Idle,
    /// No records loaded yet.
    NoData,
    /// Another tick was still in flight.
    Skipped,
    /// A data envelope was broadcast.
    Data {
        /// `sequenceIndex` of the envelope.
        sequence_index: usize,
        /// Delivery outcome.
        delivery: DeliveryReport,
    },
    /// An error frame was broadcast.
    Error {
        /// Message carried by the frame.
        message: String,
        /// Delivery outcome.
        delivery: DeliveryReport,
    },
}

impl TickReport {
    const fn outcome(&self) -> TickOutcome {
        match self {
            Self::Idle => TickOutcome::Idle,
            Self::NoData => TickOutcome::NoData,
            Self::Skipped => TickOutcome::Skipped,
            Self::Data { .. } => TickOutcome::Data,
            Self::Error { .. } => TickOutcome::Error,
        }
    }

    /// Delivery outcome, if a frame was sent.
    #[must_use]
    pub const fn delivery(&self) -> Option<&DeliveryReport> {
        match self {
            Self::Data { delivery, .. } | Self::Error { delivery, .. } => Some(delivery),
            Self::Idle | Self::NoData | Self::Skipped => None,
        }
    }
}

/// Broadcast loop lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// `run` was called while the loop is already running.
    #[error("broadcast loop is already running")]
    AlreadyRunning,

    /// The registry has been stopped and cannot be restarted.
    #[error("broadcast loop has been stopped")]
    Stopped,
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of streaming clients plus the periodic fan-out loop.
pub struct BroadcastRegistry {
    config: BroadcastConfig,
    data_source: Arc<DataSource>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    next_connection: AtomicU64,
    active: AtomicBool,
    tick_gate: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

/// Shared registry reference.
pub type SharedBroadcastRegistry = Arc<BroadcastRegistry>;

impl std::fmt::Debug for BroadcastRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastRegistry")
            .field("config", &self.config)
            .field("clients", &self.client_count())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl BroadcastRegistry {
    /// Create a registry. The loop does not run until [`Self::run`].
    #[must_use]
    pub fn new(
        config: BroadcastConfig,
        data_source: Arc<DataSource>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            data_source,
            clients: RwLock::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            active: AtomicBool::new(false),
            tick_gate: tokio::sync::Mutex::new(()),
            cancel,
        }
    }

    /// The data source this registry reads from.
    #[must_use]
    pub const fn data_source(&self) -> &Arc<DataSource> {
        &self.data_source
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `sink` under `id`, replacing any existing handle for `id`.
    ///
    /// The replaced handle's sink is dropped. Once the registry is stopped
    /// the sink is dropped immediately instead, which ends the client's
    /// stream. Never fails.
    pub fn register(&self, id: impl Into<String>, sink: Arc<dyn ClientSink>) -> ConnectionId {
        let id = id.into();
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let handle = ClientHandle {
            connection,
            sink,
            connected_at: Utc::now(),
        };

        let (replaced, total) = {
            let mut clients = self.clients.write();
            // Checked under the lock so a release in `run` cannot miss it.
            if self.cancel.is_cancelled() {
                drop(clients);
                drop(handle);
                tracing::debug!(client_id = %id, "Registry stopped, rejecting client");
                return connection;
            }
            let replaced = clients.insert(id.clone(), handle);
            (replaced, clients.len())
        };
        metrics::set_clients(total);

        if replaced.is_some() {
            tracing::info!(client_id = %id, total, "Client re-registered, previous connection replaced");
        } else {
            tracing::info!(client_id = %id, total, "Client connected");
        }

        connection
    }

    /// Remove the handle for `id` if present. Idempotent.
    ///
    /// Returns whether a handle was removed.
    pub fn unregister(&self, id: &str) -> bool {
        self.remove_if(id, |_| true)
    }

    /// Remove the handle for `id` only if it is still `connection`.
    ///
    /// Used by transports on disconnect and by the send-failure path so a
    /// stale connection never evicts the registration that replaced it.
    pub fn unregister_connection(&self, id: &str, connection: ConnectionId) -> bool {
        self.remove_if(id, |handle| handle.connection == connection)
    }

    fn remove_if(&self, id: &str, predicate: impl FnOnce(&ClientHandle) -> bool) -> bool {
        let (removed, remaining) = {
            let mut clients = self.clients.write();
            if !clients.get(id).is_some_and(predicate) {
                return false;
            }
            (clients.remove(id), clients.len())
        };
        metrics::set_clients(remaining);
        tracing::info!(client_id = %id, remaining, "Client disconnected");
        drop(removed);
        true
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether the broadcast loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Configured tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Point-in-time status.
    #[must_use]
    pub fn status(&self) -> RegistryStatus {
        let now = Utc::now();
        let mut clients: Vec<ClientInfo> = self
            .clients
            .read()
            .iter()
            .map(|(id, handle)| ClientInfo {
                id: id.clone(),
                connected_at: handle.connected_at,
                duration_ms: (now - handle.connected_at).num_milliseconds().max(0),
            })
            .collect();
        clients.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        RegistryStatus {
            clients_count: clients.len(),
            interval_ms: u64::try_from(self.interval().as_millis()).unwrap_or(u64::MAX),
            is_active: self.is_active(),
            clients,
        }
    }

    // =========================================================================
    // Data Source
    // =========================================================================

    /// Reload the data source. Registry state is untouched either way.
    ///
    /// # Errors
    ///
    /// Propagates the data source error; previous records stay in place.
    pub async fn refresh(&self) -> Result<usize, SourceError> {
        let result = self.data_source.refresh().await;
        metrics::record_refresh(result.is_ok());
        match &result {
            Ok(total) => tracing::info!(records = total, "Data source refreshed"),
            Err(e) => tracing::warn!(error = %e, "Data source refresh failed"),
        }
        result
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Run one broadcast cycle now.
    ///
    /// The loop in [`Self::run`] calls this on every interval. If a previous
    /// cycle is still in flight this one is skipped.
    pub async fn tick(&self) -> TickReport {
        let Ok(_gate) = self.tick_gate.try_lock() else {
            tracing::debug!("Previous tick still in flight, skipping");
            metrics::record_tick(TickOutcome::Skipped);
            return TickReport::Skipped;
        };

        let started = Instant::now();
        let report = self.broadcast_next().await;
        metrics::record_tick(report.outcome());
        metrics::record_tick_duration(started.elapsed());
        report
    }

    async fn broadcast_next(&self) -> TickReport {
        if self.client_count() == 0 {
            return TickReport::Idle;
        }

        let now = Utc::now();
        match self.data_source.next_with_position() {
            Ok((record, sequence_index)) => {
                let frame = Frame::from(Envelope::new(record, sequence_index, now));
                let delivery = self.send_to_all(&frame).await;
                TickReport::Data {
                    sequence_index,
                    delivery,
                }
            }
            Err(SourceError::NotLoaded) => {
                tracing::debug!("No records loaded yet, nothing to broadcast");
                TickReport::NoData
            }
            Err(e) => {
                tracing::warn!(error = %e, "Data source failed during tick, broadcasting error frame");
                let message = e.to_string();
                let frame = Frame::from(ErrorFrame::new(message.clone(), now));
                let delivery = self.send_to_all(&frame).await;
                TickReport::Error { message, delivery }
            }
        }
    }

    /// Send `frame` to every registered client.
    ///
    /// Writes run concurrently, each bounded by the send timeout. A failed
    /// write drops that client; the failure never propagates.
    pub async fn send_to_all(&self, frame: &Frame) -> DeliveryReport {
        let payload: Arc<str> = match frame.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize frame");
                return DeliveryReport::default();
            }
        };

        let targets: Vec<(String, ConnectionId, Arc<dyn ClientSink>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.connection, Arc::clone(&handle.sink)))
            .collect();

        let send_timeout = self.config.send_timeout;
        let results = join_all(targets.into_iter().map(|(id, connection, sink)| {
            let payload = Arc::clone(&payload);
            async move {
                let result = tokio::time::timeout(send_timeout, sink.send(payload))
                    .await
                    .unwrap_or(Err(SendError::TimedOut(send_timeout)));
                (id, connection, result)
            }
        }))
        .await;

        let mut report = DeliveryReport {
            attempted: results.len(),
            ..DeliveryReport::default()
        };
        for (id, connection, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "Send failed, dropping client");
                    metrics::record_send_failure(e.reason());
                    self.unregister_connection(&id, connection);
                    report.dropped.push(id);
                }
            }
        }

        let kind = if frame.is_error() {
            FrameKind::Error
        } else {
            FrameKind::Data
        };
        metrics::record_frames_sent(kind, report.delivered as u64);

        report
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drive [`Self::tick`] on the configured interval until stopped.
    ///
    /// The first tick fires one interval after start. On exit every client
    /// handle is released so transports can close their streams.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::AlreadyRunning`] if the loop is already
    /// running, or [`BroadcastError::Stopped`] after [`Self::stop`].
    pub async fn run(self: Arc<Self>) -> Result<(), BroadcastError> {
        if self.cancel.is_cancelled() {
            return Err(BroadcastError::Stopped);
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(BroadcastError::AlreadyRunning);
        }

        tracing::info!(
            interval_ms = self.config.interval.as_millis(),
            "Broadcast loop started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        let released = std::mem::take(&mut *self.clients.write());
        metrics::set_clients(0);
        tracing::info!(released = released.len(), "Broadcast loop stopped");
        Ok(())
    }

    /// Stop the broadcast loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
