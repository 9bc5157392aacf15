//! Core error types for breathflow-core.
//!
//! Feature degradation is not an error: camera, audio and AI failures are
//! recorded as feature statuses.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionPhase;

/// Core error type for breathflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Local store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the session state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The requested intent is not valid in the current phase.
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: SessionPhase,
        action: &'static str,
    },

    /// The breathing pattern failed validation.
    #[error("invalid breathing pattern: {0}")]
    InvalidPattern(#[from] ValidationError),

    /// The phase clock could not keep time.
    #[error("timing fault: {0}")]
    Clock(#[from] ClockFault),
}

/// Faults reported by the phase clock's time source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockFault {
    /// The time source could not be read.
    #[error("time source unavailable: {0}")]
    Unavailable(String),

    /// A reading went backwards.
    #[error("clock went backwards from {previous_ms}ms to {now_ms}ms")]
    Regressed { previous_ms: u64, now_ms: u64 },
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Offline store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored payload could not be decoded
    #[error("Corrupt session payload for '{id}': {message}")]
    CorruptPayload { id: String, message: String },
}

/// Remote sync errors. None of these reach the session completion flow.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Device is offline")]
    Offline,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote rejected batch with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseBusy
                    || code.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
