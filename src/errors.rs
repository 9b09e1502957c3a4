//! Error types for the crash game engine
//!
//! One root error carries the caller-facing taxonomy (validation, ownership,
//! settlement race, balance, storage). Storage and configuration failures keep
//! their own sub-enums so the source chain survives up to the HTTP layer.

use thiserror::Error;

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum CrashError {
    /// Bad bet amount, malformed input, invalid settings
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Game, user, wallet or active settings absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Game owned by another user, or account banned
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Another caller already settled the game
    #[error("Game {0} is already completed")]
    AlreadyCompleted(u64),

    #[error("Insufficient wallet balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// The atomic unit could not commit; nothing it wrote is visible
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

impl CrashError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CrashError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CrashError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        CrashError::Forbidden(msg.into())
    }

    /// True when the error means "someone else settled first"
    pub fn is_already_completed(&self) -> bool {
        matches!(self, CrashError::AlreadyCompleted(_))
    }
}

// External error conversions
impl From<rocksdb::Error> for CrashError {
    fn from(e: rocksdb::Error) -> Self {
        CrashError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for CrashError {
    fn from(e: serde_json::Error) -> Self {
        CrashError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<std::io::Error> for CrashError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                CrashError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
            }
            _ => CrashError::Storage(StorageError::ReadFailed(e.to_string())),
        }
    }
}

impl From<toml::de::Error> for CrashError {
    fn from(e: toml::de::Error) -> Self {
        CrashError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

// Convenience type alias for Results
pub type CrashResult<T> = Result<T, CrashError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_display() {
        let err = CrashError::validation("bet too small");
        assert!(err.to_string().contains("Validation failed"));
        assert!(err.to_string().contains("bet too small"));
    }

    #[test]
    fn test_insufficient_balance_details() {
        let err = CrashError::InsufficientBalance {
            required: 1500.0,
            available: 200.0,
        };
        assert!(err.to_string().contains("required 1500.00"));
        assert!(err.to_string().contains("available 200.00"));
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let err: CrashError = StorageError::CommitFailed("busy".to_string()).into();
        match &err {
            CrashError::Storage(StorageError::CommitFailed(_)) => {}
            other => panic!("Expected commit failure, got {:?}", other),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_already_completed_predicate() {
        assert!(CrashError::AlreadyCompleted(7).is_already_completed());
        assert!(!CrashError::not_found("game").is_already_completed());
    }
}
