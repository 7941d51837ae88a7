//! Error types for pathstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for pathstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Path Errors
    // -------------------------------------------------------------------------
    #[error("path '{0}' doesn't exist")]
    PathNotFound(String),

    #[error("failed to resolve path '{0}'")]
    UnresolvablePath(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("failed to access {0}")]
    Access(String),

    #[error("backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("record corruption detected at '{0}'")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Store Helper Errors
    // -------------------------------------------------------------------------
    #[error("recursive object depth reached")]
    RecursionLimit,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}
