//! Error types for dman.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for dman operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DmanError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement in a batch failed at the database (syntax errors,
    /// constraint violations, etc.). The batch was rolled back.
    #[error("Query error: {0}")]
    Query(String),

    /// Every statement succeeded but the final COMMIT failed.
    /// Nothing from the batch was persisted.
    #[error("Commit error: {0}")]
    Commit(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, I/O on local files, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DmanError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a commit error with the given message.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Commit(_) => "Commit Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    ///
    /// For database failures this is the server's own text.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Query(msg)
            | Self::Commit(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using DmanError.
pub type Result<T> = std::result::Result<T, DmanError>;
