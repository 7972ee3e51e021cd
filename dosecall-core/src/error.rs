//! Error types for dosecall-core

use thiserror::Error;

/// Main error type for the dosecall-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or malformed required event field
    #[error("invalid event: {0}")]
    Validation(String),

    /// Session not found for an update
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session already exists for a create
    #[error("session already exists: {0}")]
    DuplicateSession(String),

    /// Telephony provider API error
    #[error("provider error: {0}")]
    Provider(String),
}

/// Result type alias for dosecall-core
pub type Result<T> = std::result::Result<T, Error>;
