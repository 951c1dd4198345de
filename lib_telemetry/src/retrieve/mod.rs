//! # Data Retrieval Module
//!
//! HTTP plumbing shared by the delivery engine and the binaries.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with optional automatic retries using exponential
//!   backoff for transient failures. The engine's HTTP transport posts every
//!   event through it.

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
