//! Core error types for questlog-core.
//!
//! The rewards engine rejects operations with [`RewardError`]; storage and
//! configuration failures are layered on top in [`CoreError`]. Every error is
//! local to one user's event and can be retried or surfaced to the user.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Core error type for questlog-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected reward operation
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Another writer got in the way: the snapshot went stale or the database
    /// stayed locked past the busy timeout. Reloading and retrying is safe.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            CoreError::Reward(RewardError::ConcurrentModification { .. })
                | CoreError::Database(DatabaseError::Locked)
        )
    }
}

/// Rejections produced by the rewards engine.
///
/// None of these leave partial state behind: the snapshot passed in is never
/// mutated and no ledger or history rows are produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    /// Malformed input (difficulty out of range, wrong-signed amount, ...)
    #[error("Invalid value for '{field}': {message}")]
    InvalidInput { field: String, message: String },

    /// Activity date precedes the last recorded activity or lies in the future
    #[error("Clock skew: activity on {activity_date} (last activity {last_activity:?}, server date {today})")]
    ClockSkew {
        last_activity: Option<NaiveDate>,
        activity_date: NaiveDate,
        today: NaiveDate,
    },

    /// A spend exceeds the current balance
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    /// The persisted snapshot changed since it was read
    #[error("Concurrent modification for user '{user_id}': expected version {expected_version}, found {found_version}")]
    ConcurrentModification {
        user_id: String,
        expected_version: u64,
        found_version: u64,
    },
}

impl RewardError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        RewardError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the caller should re-fetch a fresh snapshot and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RewardError::ConcurrentModification { .. } | RewardError::ClockSkew { .. }
        )
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
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

    /// Stored value could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Failed to locate the data directory
    #[error("Cannot access data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
