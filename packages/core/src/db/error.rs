//! Database Error Types
//!
//! Error types for connection, schema initialization, statement execution
//! and row decoding failures.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers the storage-level failures. Domain errors (missing pages, invalid
/// moves) are reported by the tree and service layers.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// The database file's directory could not be created
    #[error("Cannot create database directory for {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A row could not be decoded into a model
    #[error("Failed to decode {entity} row: {context}")]
    RowDecodeError { entity: &'static str, context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn directory_creation_failed(path: PathBuf, source: std::io::Error) -> Self {
        Self::DirectoryCreationFailed { path, source }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a row decoding error
    pub fn row_decode(entity: &'static str, context: impl Into<String>) -> Self {
        Self::RowDecodeError {
            entity,
            context: context.into(),
        }
    }
}
