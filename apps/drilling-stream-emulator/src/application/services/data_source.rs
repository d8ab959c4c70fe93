//! Cyclic Data Source
//!
//! Caches the record table fetched from a [`RecordSource`] and replays it one
//! record at a time, wrapping around forever.
//!
//! # Concurrency
//!
//! The record set and the cursor position live together behind one
//! `parking_lot::Mutex`, held only for the swap or the advance. Fetching
//! happens outside that lock, so a slow upstream never stalls `next()`.
//! Concurrent refreshes are serialized by a separate async gate so they swap
//! in the order they started.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{RecordSource, SourceError};
use crate::domain::cursor::RecordCursor;
use crate::domain::record::Record;

/// Snapshot of the data source state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInfo {
    /// Number of cached records (0 before the first successful load).
    pub total_rows: usize,
    /// Cursor position.
    pub current_index: usize,
    /// Whether a record set is cached.
    pub loaded: bool,
    /// Message of the most recent failed load, cleared on success.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct CursorState {
    cursor: Option<RecordCursor>,
    last_error: Option<SourceError>,
}

/// Record cache with a cyclic read cursor.
pub struct DataSource {
    source: Arc<dyn RecordSource>,
    state: Mutex<CursorState>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("info", &self.info())
            .finish_non_exhaustive()
    }
}

impl DataSource {
    /// Create an empty data source backed by `source`.
    #[must_use]
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            state: Mutex::new(CursorState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Fetch the record table and replace the cache.
    ///
    /// On success the cursor is reset to 0 and the number of records is
    /// returned. On failure the previous records and position are kept.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the upstream fetch fails and
    /// [`SourceError::Empty`] if it returns no records.
    pub async fn load(&self) -> Result<usize, SourceError> {
        let _gate = self.refresh_gate.lock().await;

        tracing::info!("Loading records from data source");
        let fetched = self.source.fetch_all().await;

        let result = fetched.and_then(|records| RecordCursor::new(records).ok_or(SourceError::Empty));

        let mut state = self.state.lock();
        match result {
            Ok(cursor) => {
                let total = cursor.len();
                state.cursor = Some(cursor);
                state.last_error = None;
                drop(state);
                tracing::info!(records = total, "Records loaded");
                Ok(total)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                drop(state);
                tracing::error!(error = %e, "Failed to load records");
                Err(e)
            }
        }
    }

    /// Reload the record table. Same semantics as [`Self::load`].
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub async fn refresh(&self) -> Result<usize, SourceError> {
        self.load().await
    }

    /// Take the current record and advance the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotLoaded`] before the first load attempt, or
    /// the error of the last attempt if nothing has loaded successfully.
    pub fn next(&self) -> Result<Record, SourceError> {
        self.next_with_position().map(|(record, _)| record)
    }

    /// Take the current record and advance, returning the new position.
    ///
    /// Record and position are read under the same lock, so a concurrent
    /// refresh is observed either entirely before or entirely after.
    ///
    /// # Errors
    ///
    /// See [`Self::next`].
    pub fn next_with_position(&self) -> Result<(Record, usize), SourceError> {
        let mut state = self.state.lock();
        match state.cursor.as_mut() {
            Some(cursor) => Ok(cursor.advance()),
            None => Err(state.last_error.clone().unwrap_or(SourceError::NotLoaded)),
        }
    }

    /// Current cursor position (0 before any load).
    #[must_use]
    pub fn position(&self) -> usize {
        self.state.lock().cursor.as_ref().map_or(0, RecordCursor::position)
    }

    /// Whether a record set is cached.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.lock().cursor.is_some()
    }

    /// Point-in-time snapshot of the cache.
    #[must_use]
    pub fn info(&self) -> DataInfo {
        let state = self.state.lock();
        DataInfo {
            total_rows: state.cursor.as_ref().map_or(0, RecordCursor::len),
            current_index: state.cursor.as_ref().map_or(0, RecordCursor::position),
            loaded: state.cursor.is_some(),
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }
}
