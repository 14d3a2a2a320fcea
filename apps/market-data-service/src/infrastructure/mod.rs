//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loading from the environment.
pub mod config;

/// Venue WebSocket adapters and the equities connection registry.
pub mod feeds;

/// HTTP query API and operational endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Snapshot store backends.
pub mod store;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;
