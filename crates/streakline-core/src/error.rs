//! Core error types for streakline-core.
//!
//! The hierarchy mirrors the engine's fault classes: storage faults abort or
//! surface to the caller, delivery faults block the dispatch commit, and
//! computation faults fail closed for the habit being processed.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for streakline-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Read/write failure against the log or progress store
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A nudge could not be handed off to delivery
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Malformed log data
    #[error("Computation error: {0}")]
    Computation(#[from] ComputationError),

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

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
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

    /// Referenced habit does not exist
    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    /// Could not resolve the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Delivery-specific errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The delivery mechanism rejected the nudge
    #[error("Delivery rejected '{kind}' nudge: {message}")]
    Rejected { kind: String, message: String },

    /// The delivery mechanism is not reachable
    #[error("Delivery unavailable: {0}")]
    Unavailable(String),

    /// Handoff did not complete in time
    #[error("Delivery timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Errors raised while deriving metrics from stored data.
#[derive(Error, Debug)]
pub enum ComputationError {
    /// A stored date or timestamp could not be parsed
    #[error("Unparseable {field} '{value}' for habit {habit_id}")]
    MalformedDate {
        habit_id: String,
        field: &'static str,
        value: String,
    },

    /// A stored enum value is not recognised
    #[error("Unknown {field} '{value}'")]
    UnknownVariant { field: &'static str, value: String },

    /// A habit goal that cannot yield a completion fraction
    #[error("Habit {habit_id} has non-positive goal {goal}")]
    InvalidGoal { habit_id: String, goal: f64 },

    /// A log handed in for one habit belongs to another
    #[error("Log for habit {log_habit_id} passed with habit {habit_id}")]
    ForeignLog {
        habit_id: String,
        log_habit_id: String,
    },

    /// A trailing window reaches past the representable calendar
    #[error("{window} of {days} days before {from} is out of range")]
    DateOutOfRange {
        window: &'static str,
        days: i64,
        from: chrono::NaiveDate,
    },
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

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Empty required field
    #[error("Field '{0}' must not be empty")]
    Empty(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

impl CoreError {
    /// Whether the fault is transient and the operation should simply be
    /// retried on the next scheduled run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Storage(StorageError::Locked | StorageError::QueryFailed(_))
                | CoreError::Delivery(_)
        )
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
