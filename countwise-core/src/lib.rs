//! # countwise-core
//!
//! Core library for countwise - local usage counters with opt-in reporting.
//!
//! This library provides:
//! - A persistent counter store (integers, floats, flags, strings) in SQLite
//! - An enablement gate that turns every operation into a no-op when off
//! - A per-install identifier backed by a single file
//! - Report queries: one HTTP GET carrying every stored entry
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use countwise_core::{Analytics, Config, Store};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = Arc::new(Store::open(Config::data_dir()).expect("failed to open store"));
//! let analytics = Analytics::new(store, config.analytics).expect("invalid analytics config");
//!
//! analytics.increment("app_opened").expect("failed to update counter");
//! ```

// Re-export commonly used items at the crate root
pub use analytics::Analytics;
pub use config::{AnalyticsConfig, Config};
pub use error::{Error, Result};
pub use report::{AnalyticsListener, CancellationToken, QueryHandle, QueryOutcome};
pub use store::Store;
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod store;
pub mod types;
