//! Broadcast Frames
//!
//! Two frame kinds are pushed to clients, one per tick:
//!
//! ```json
//! { "schemaVersion": "1.0.0", "timestamp": 1700000000000, "sequenceIndex": 1, "values": { "depth": 100 } }
//! { "type": "error", "data": { "message": "...", "timestamp": 1700000000000 } }
//! ```
//!
//! Clients tell them apart by the `type` discriminant, which only error
//! frames carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::record::Record;

/// Schema version stamped on every data envelope.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Versioned, timestamped wrapper around one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Cursor position after the record was taken.
    pub sequence_index: usize,
    /// The record payload.
    pub values: Record,
}

impl Envelope {
    /// Wrap a record taken at `sequence_index`.
    #[must_use]
    pub fn new(values: Record, sequence_index: usize, at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: at.timestamp_millis(),
            sequence_index,
            values,
        }
    }
}

/// Body of an error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Human-readable failure description.
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Frame sent instead of a data envelope when the data source fails mid-tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Always `"error"`.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Error details.
    pub data: ErrorData,
}

/// Discriminant carried by error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Data source failure.
    Error,
}

impl ErrorFrame {
    /// Build an error frame.
    #[must_use]
    pub fn new(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: ErrorKind::Error,
            data: ErrorData {
                message: message.into(),
                timestamp: at.timestamp_millis(),
            },
        }
    }
}

/// Anything the registry hands to a client sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Error frame. Listed first so deserialization matches on `type`.
    Error(ErrorFrame),
    /// Data envelope.
    Data(Envelope),
}

impl Frame {
    /// Whether this is an error frame.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Serialize to the single-line JSON written to the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        Self::Data(envelope)
    }
}

impl From<ErrorFrame> for Frame {
    fn from(frame: ErrorFrame) -> Self {
        Self::Error(frame)
    }
}
