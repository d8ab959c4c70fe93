//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surfaces.

/// Client registry and periodic fan-out loop.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Notion data source adapter.
pub mod notion;

/// Server-Sent Events endpoint.
pub mod sse;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
