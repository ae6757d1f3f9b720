//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through buffered, append-only logging
//! across a set of numbered, size-capped files.
//!
//! ## Responsibilities
//! - Frame user records with an LSN and a CRC32 checksum
//! - Batch frames in memory and flush them to the active file
//! - Seal full files and rotate to the next one
//! - Replay flushed records in LSN order, detecting corruption
//!
//! ## Directory Layout
//! ```text
//! {log_dir}/
//!   ├── 0000000000000000.{suffix}   sealed, immutable
//!   ├── 0000000000000001.{suffix}   sealed, immutable
//!   ├── 0000000000000002.{suffix}   active (append target)
//!   └── control.{suffix}            checkpoint anchor (optional)
//! ```
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ File Header (32 bytes)                                   │
//! │   Magic "DWAL" (4) | Version u16 (2) | Reserved u16 (2)  │
//! │   FileNumber u64 (8) | BaseLSN u64 (8)                   │
//! │   HeaderCRC u32 (4) | Padding (4)                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Frame 1                                                  │
//! │ ┌─────────┬─────────┬─────────┬─────────┐                │
//! │ │ LSN (8) │ CRC (4) │ Len (4) │ Payload │                │
//! │ └─────────┴─────────┴─────────┴─────────┘                │
//! ├──────────────────────────────────────────────────────────┤
//! │ Frame 2 ...                                              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The frame CRC covers LSN, length and payload. A frame is never split
//! across two files.

mod anchor;
mod buffer;
mod control;
mod file_manager;
mod flusher;
mod frame;
mod log;
mod record;
mod scanner;
mod verify;

pub use anchor::LogAnchor;
pub use buffer::LogBuffer;
pub use control::ControlFile;
pub use file_manager::{FileHeader, FileSnapshot, FileState, LogFile, LogFileManager};
pub use frame::{checksum, encode_frame, FrameHeader};
pub use log::Log;
pub use record::UserLogRecord;
pub use scanner::LogScanner;
pub use verify::{LogVerifier, VerifyReport};

// =============================================================================
// Shared Constants (used by file manager, frame codec, scanner)
// =============================================================================

/// Magic bytes identifying a dirwal log file
pub const MAGIC: &[u8; 4] = b"DWAL";

/// Current log file format version
pub const VERSION: u16 = 1;

/// File header size: Magic (4) + Version (2) + Reserved (2) + FileNumber (8)
/// + BaseLSN (8) + HeaderCRC (4) + Padding (4) = 32 bytes
pub const FILE_HEADER_SIZE: u64 = 32;

/// Frame header size: LSN (8) + CRC (4) + Len (4) = 16 bytes
pub const FRAME_HEADER_SIZE: usize = 16;

/// LSN carried by the first record of a fresh log
pub const FIRST_LSN: u64 = 1;
