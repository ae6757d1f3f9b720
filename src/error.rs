//! Error types for dirwal
//!
//! Provides a unified error type for all log operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LogError
pub type Result<T> = std::result::Result<T, LogError>;

/// Unified error type for log operations
#[derive(Debug, Error)]
pub enum LogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid log configuration: {0}")]
    Config(String),

    #[error("Invalid log file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Log corruption in {} at offset {offset}: {reason}", path.display())]
    Corrupted {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Append Errors
    // -------------------------------------------------------------------------
    #[error("Record of {size} bytes exceeds the maximum frame size of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Log is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Control File Errors
    // -------------------------------------------------------------------------
    #[error("Control file error: {0}")]
    Control(String),
}

impl LogError {
    /// True for the errors that describe a bad or damaged log rather than a
    /// failing device: configuration problems, bad file headers, corrupt
    /// frames and unusable control files.
    pub fn is_invalid_log(&self) -> bool {
        matches!(
            self,
            LogError::Config(_)
                | LogError::InvalidFile { .. }
                | LogError::Corrupted { .. }
                | LogError::RecordTooLarge { .. }
                | LogError::Control(_)
        )
    }

    /// True when the error is a checksum or sequencing failure in a frame.
    pub fn is_corruption(&self) -> bool {
        matches!(self, LogError::Corrupted { .. })
    }

    pub(crate) fn corrupted(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        LogError::Corrupted {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LogError::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for LogError {
    fn from(err: bincode::Error) -> Self {
        LogError::Control(err.to_string())
    }
}
