//! Error types for waypost-store.

use std::path::PathBuf;

/// Result type for waypost-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waypost-store.
///
/// Any failing operation leaves the store unchanged; callers may treat an
/// `Err` as "no state change happened".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
