//! Notion Adapter
//!
//! [`RecordSource`](crate::application::ports::RecordSource) implementation
//! over the Notion data sources API, plus the startup retry policy.
//!
//! # Modules
//!
//! - `client`: Paginated query client
//! - `page`: Response payload models and number extraction
//! - `retry`: Exponential backoff for the initial load

pub mod client;
pub mod page;
pub mod retry;

pub use client::{NotionConfig, NotionError, NotionRecordSource};
pub use retry::{RetryConfig, RetryPolicy, load_with_retry};
