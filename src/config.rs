//! Configuration for dirwal
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LogError, Result};
use crate::wal::{FILE_HEADER_SIZE, FRAME_HEADER_SIZE};

/// Configuration for a [`Log`](crate::Log) instance
#[derive(Debug, Clone)]
pub struct LogConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the log files
    /// Internal structure:
    ///   {log_dir}/
    ///     ├── 0000000000000000.{suffix}   (sealed)
    ///     ├── 0000000000000001.{suffix}   (active)
    ///     └── control.{suffix}            (checkpoint anchor, optional)
    pub log_dir: PathBuf,

    /// File extension of the log files, without the dot
    pub suffix: String,

    /// Size cap of a single log file, header included (bytes)
    pub file_size_cap: u64,

    // -------------------------------------------------------------------------
    // Buffer Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the in-memory append buffer (bytes)
    pub buffer_size: usize,

    /// Background flush period; `None` flushes only on demand
    pub flush_interval: Option<Duration>,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// When buffer flushes are forced to stable storage
    pub sync_strategy: SyncStrategy,

    /// Whether a new scanner sees records still sitting in the buffer
    pub scan_visibility: ScanVisibility,
}

/// Fsync policy for buffer flushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync only for `force_durable` appends, `sync()` and shutdown
    OnDemand,

    /// fsync after every buffer flush (safest, slowest)
    EveryFlush,
}

/// Visibility of buffered records to `begin_scan`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVisibility {
    /// Scanners see only bytes already written to a log file
    FlushedOnly,

    /// `begin_scan` flushes the buffer (without fsync) before taking its snapshot
    FlushOnScan,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./dirwal_data"),
            suffix: "log".to_string(),
            file_size_cap: 64 * 1024 * 1024, // 64 MB
            buffer_size: 64 * 1024,          // 64 KB
            flush_interval: None,
            sync_strategy: SyncStrategy::OnDemand,
            scan_visibility: ScanVisibility::FlushedOnly,
        }
    }
}

impl LogConfig {
    /// Create a new config builder
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Check the parameters against each other
    ///
    /// A full buffer must always fit into a freshly created file, so one
    /// flush never has to span two files.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size <= FRAME_HEADER_SIZE {
            return Err(LogError::Config(format!(
                "buffer size {} cannot hold a single frame",
                self.buffer_size
            )));
        }
        if self.buffer_size > u32::MAX as usize {
            return Err(LogError::Config(format!(
                "buffer size {} exceeds the frame length limit",
                self.buffer_size
            )));
        }
        if self.file_size_cap <= FILE_HEADER_SIZE {
            return Err(LogError::Config(format!(
                "file size cap {} must exceed the {} byte file header",
                self.file_size_cap, FILE_HEADER_SIZE
            )));
        }
        if self.buffer_size as u64 > self.file_size_cap - FILE_HEADER_SIZE {
            return Err(LogError::Config(format!(
                "buffer size {} does not fit in a log file capped at {} bytes",
                self.buffer_size, self.file_size_cap
            )));
        }
        if self.suffix.is_empty() || self.suffix.contains(['.', '/', '\\']) {
            return Err(LogError::Config(format!("invalid log file suffix {:?}", self.suffix)));
        }
        if matches!(self.flush_interval, Some(d) if d.is_zero()) {
            return Err(LogError::Config("flush interval must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for LogConfig
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    /// Set the log directory
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_dir = path.into();
        self
    }

    /// Set the log file suffix
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.suffix = suffix.into();
        self
    }

    /// Set the per-file size cap (in bytes)
    pub fn file_size_cap(mut self, size: u64) -> Self {
        self.config.file_size_cap = size;
        self
    }

    /// Set the append buffer capacity (in bytes)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Enable a background flush every `interval`
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = Some(interval);
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the scan visibility policy
    pub fn scan_visibility(mut self, visibility: ScanVisibility) -> Self {
        self.config.scan_visibility = visibility;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}
