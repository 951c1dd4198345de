//! # lib_telemetry
//!
//! Client-side telemetry buffering and delivery. Callers track events through a
//! [`TelemetryService`]; events are queued in memory, mirrored to a persistent
//! store, and flushed in batches to an HTTP ingest endpoint on a timer or when
//! the batch threshold is reached. Failed deliveries stay queued and are
//! retried on the next cycle.
//!
//! Storage and platform are capabilities injected at construction, so the same
//! engine runs on top of an in-memory map, a JSON file or Redis.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Storage and platform capabilities plus their built-in backends.
pub mod adapters;
/// Layered settings (defaults, file, environment, flags).
#[cfg(feature = "configs")]
pub mod configs;
/// Connections to external key-value services.
#[cfg(feature = "connections")]
pub mod connections;
/// Events, session bootstrap, transport and the delivery engine.
pub mod core;
/// stdout + file logging for the binaries.
#[cfg(feature = "loggers")]
pub mod loggers;
/// HTTP client with retry middleware.
pub mod retrieve;
/// Small helpers (identifiers, timestamps).
pub mod utils;

pub use adapters::{
    FileStore, MemoryStore, NativePlatformAdapter, Platform, PlatformAdapter,
    StaticPlatformAdapter, StorageAdapter, StorageError,
};
pub use crate::core::{
    create_with_adapters, Clock, ConfigError, FlushReport, IngestPath, Lifecycle, ManualClock,
    Metadata, PerformanceMetric, ScreenScope, ScreenViewEvent, SystemClock, TelemetryConfig,
    TelemetryError, TelemetryEvent, TelemetryService, Transport, TransportError,
};

#[cfg(feature = "configs")]
pub use configs::{StorageBackend, TelemetrySettings};
#[cfg(feature = "configs")]
pub use crate::core::factory::create_from_settings;
