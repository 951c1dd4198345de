//! # Loggers Module
//!
//! The library itself only emits through the `log` facade. Binaries install a
//! sink with `loggerlocal::setup_logging`.

/// fern dispatcher writing to stdout and a rotated log file.
pub mod loggerlocal;

pub use loggerlocal::setup_logging;
