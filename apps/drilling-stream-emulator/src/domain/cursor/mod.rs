//! Cyclic Record Cursor
//!
//! Read-only iteration over a non-empty record set that wraps around forever.
//! `advance` hands out the record at the current position and then moves the
//! position to `(position + 1) % len`.
//!
//! The cursor is a plain value; callers that share it across tasks keep the
//! record set and the position behind a single lock so a swap can never be
//! observed half-done.

use std::sync::Arc;

use crate::domain::record::Record;

/// Cursor over a non-empty, immutable record set.
#[derive(Debug, Clone)]
pub struct RecordCursor {
    records: Arc<[Record]>,
    position: usize,
}

impl RecordCursor {
    /// Create a cursor positioned at the first record.
    ///
    /// Returns `None` for an empty record set.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        Some(Self {
            records: records.into(),
            position: 0,
        })
    }

    /// Take the record at the current position and advance.
    ///
    /// Returns the record together with the position *after* the advance.
    pub fn advance(&mut self) -> (Record, usize) {
        let record = self.records[self.position].clone();
        self.position = (self.position + 1) % self.records.len();
        (record, self.position)
    }

    /// Current position, always in `[0, len)`.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always `false`; an empty cursor cannot be constructed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}
