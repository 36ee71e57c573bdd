//! Nexa Manager realtime consumer.
//!
//! Orchestrates the realtime client for the application:
//! - Connection from TOML configuration
//! - Startup subscriptions, restored on every reconnect
//! - Query cache invalidation driven by realtime events
//! - Prometheus metrics and periodic stats logging

pub mod app;
pub mod bindings;
pub mod cache;
pub mod config;
pub mod error;

pub use app::Application;
pub use bindings::{register_cache_handlers, CacheBindings};
pub use cache::{CacheEntry, InMemoryQueryCache, QueryCache, QueryKey};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
