//! # Adapters Module
//!
//! The two capabilities the delivery engine depends on but does not implement:
//!
//! - **`storage`**: async key/value string storage (`get`, `set`, `remove`).
//! - **`platform`**: the running platform identifier and application version.
//!
//! Any backend satisfying these contracts is interchangeable. The host picks
//! one explicitly at startup and hands it to the engine; nothing in here sniffs
//! the runtime environment.
//!
//! Built-in storage backends are `MemoryStore` and `FileStore`; a Redis-backed
//! store lives under `connections` behind the `connections` feature.

/// Storage capability and its error type.
pub mod storage;
/// Process-local storage backend.
pub mod memory_store;
/// JSON-file storage backend.
pub mod file_store;
/// Platform capability and built-in adapters.
pub mod platform;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use platform::{NativePlatformAdapter, Platform, PlatformAdapter, StaticPlatformAdapter};
pub use storage::{StorageAdapter, StorageError};
