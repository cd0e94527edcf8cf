//! Error types for countwise-core

use thiserror::Error;

use crate::types::ValueKind;

/// Main error type for the countwise-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A key was mutated with a different value kind than it holds
    #[error("key {key:?} holds a {stored} value, cannot use it as {requested}")]
    TypeMismatch {
        key: String,
        stored: ValueKind,
        requested: ValueKind,
    },

    /// A value that cannot be stored
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The installation id file could not be created or read
    #[error("installation id unavailable: {0}")]
    Installation(String),

    /// Report transport error
    #[error("report error: {0}")]
    Report(String),
}

/// Result type alias for countwise-core
pub type Result<T> = std::result::Result<T, Error>;
