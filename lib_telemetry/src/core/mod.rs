//! # Core Module
//!
//! The delivery engine and everything it stamps, queues and sends.
//!
//! ## Contained Modules
//! - **`event`**: wire records (`TelemetryEvent`, `ScreenViewEvent`, `PerformanceMetric`).
//! - **`config`**: the validated `TelemetryConfig`.
//! - **`clock`**: timestamp source, swappable for a manual clock.
//! - **`session`**: user/session identifier bootstrap and storage slot names.
//! - **`transport`**: the `Transport` seam and its HTTP implementation.
//! - **`service`**: `TelemetryService`, the queue and flush engine.
//! - **`screen`**: `ScreenScope`, screen-bound tracking helpers.
//! - **`factory`**: engine assembly from adapters or settings.

/// Timestamp sources.
pub mod clock;
/// Engine configuration.
pub mod config;
/// Wire records.
pub mod event;
/// Engine assembly.
pub mod factory;
/// Screen-bound tracking helpers.
pub mod screen;
/// The delivery engine.
pub mod service;
/// Identity bootstrap.
pub mod session;
/// Delivery seam.
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, TelemetryConfig};
pub use event::{Metadata, PerformanceMetric, ScreenViewEvent, TelemetryEvent};
pub use factory::create_with_adapters;
pub use screen::ScreenScope;
pub use service::{FlushReport, Lifecycle, TelemetryError, TelemetryService};
pub use session::SessionIdentity;
pub use transport::{HttpTransport, IngestPath, Transport, TransportError};
