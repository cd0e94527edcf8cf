//! Storage layer for countwise
//!
//! This module provides:
//! - A SQLite store with separate `counters` and `settings` tables
//! - Schema migrations
//! - The installation id file kept next to the database

pub mod installation;
pub mod repo;
pub mod schema;

pub use installation::{InstallationId, INSTALLATION_FILE};
pub use repo::{Store, DATABASE_FILE};
