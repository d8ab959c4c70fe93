//! Configuration Module
//!
//! Configuration loading for the emulator service.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, EmulatorConfig, LoadRetrySettings, NotionSettings,
    ServerSettings,
};
