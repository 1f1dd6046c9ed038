//! Error types for HealthQuery
//!
//! This module defines all error types used throughout the persistence
//! engine, using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for HealthQuery persistence operations
///
/// Covers failures from both storage tiers (the SQLite conversation index
/// and the sled message store) plus the serialization boundary between them.
#[derive(Error, Debug)]
pub enum HealthqueryError {
    /// Storage errors (database open, read, write, delete failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors (data directory resolution)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for HealthQuery operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
