//! Error types for keyfreqlib

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while recording, loading or saving counters
#[derive(Error, Debug)]
pub enum KeyfreqError {
    /// Another live process holds the store lock
    #[error("store lock '{path}' is held by another process")]
    LockBusy { path: PathBuf },

    /// Persisted store content could not be parsed
    #[error("corrupt store '{path}' at line {line}: {message}")]
    CorruptStore {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Writing the merged store failed
    #[error("failed to write store '{path}': {source}")]
    WriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a store or lock file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The same source was loaded twice into one table before it was cleared
    #[error("store '{path}' was already merged into this table")]
    DuplicateLoad { path: PathBuf },

    /// Invalid glob pattern in the exclusion filter
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
