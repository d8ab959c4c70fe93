//! Domain Layer - Core record types and cursor logic.
//!
//! This layer contains the core domain types for the drilling data stream
//! with no I/O. All types here are plain Rust with serialization support.

/// Cyclic cursor over a loaded record set.
pub mod cursor;

/// Wire frames handed to streaming clients (data envelopes and error frames).
pub mod envelope;

/// Validated numeric records.
pub mod record;
