//! # Configuration Module
//!
//! Layered settings for hosts and binaries.
//!
//! ## Contained Modules
//! - **`config_telemetry`**: `TelemetrySettings`, merged from defaults, a JSON
//!   file, `TELEMETRY_*` environment variables and command-line flags, and
//!   turned into a validated `TelemetryConfig`.

/// Settings layering and validation.
pub mod config_telemetry;

pub use config_telemetry::{StorageBackend, TelemetrySettings};
