//! # Connections Module
//!
//! Storage backends that live outside the process.
//!
//! ## Contained Modules
//! - **`cache_redis`**: `RedisStore`, a `StorageAdapter` over a multiplexed,
//!   auto-reconnecting Redis connection.

/// Redis-backed storage.
pub mod cache_redis;

pub use cache_redis::RedisStore;
