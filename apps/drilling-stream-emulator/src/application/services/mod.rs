//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `DataSource`: Caches the fetched record set and replays it cyclically

mod data_source;

pub use data_source::{DataInfo, DataSource};
