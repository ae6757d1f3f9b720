//! # dirwal
//!
//! The write-ahead log of a directory-server storage stack:
//! - Buffered appends with per-record durability control
//! - Size-capped log files, sealed and rotated automatically
//! - CRC32-verified frames and ordered replay through scanners
//! - Torn-write recovery on open
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Entry store / recovery                      │
//! │            log(record, force) · begin_scan()                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Log                                  │
//! │                (single-writer mutex)                        │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//!  ┌───────────┐        ┌───────────────┐       ┌──────────────┐
//!  │ LogBuffer │──────▶ │LogFileManager │ ◀──── │  LogScanner  │
//!  │ (memory)  │ flush  │ sealed|active │ read  │ (snapshot)   │
//!  └───────────┘        └───────────────┘       └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{LogConfig, ScanVisibility, SyncStrategy};
pub use error::{LogError, Result};
pub use wal::{Log, LogAnchor, LogScanner, UserLogRecord};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of dirwal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
