//! Log anchors
//!
//! A position in the log: which file, which byte, which LSN.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of a single record in the log
///
/// Anchors order by `(file_number, offset)`, which matches LSN order for
/// anchors taken from the same log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogAnchor {
    /// Number of the log file holding the record
    pub file_number: u64,

    /// Byte offset of the frame inside that file
    pub offset: u64,

    /// Log Sequence Number of the record
    pub lsn: u64,
}

impl LogAnchor {
    pub fn new(file_number: u64, offset: u64, lsn: u64) -> Self {
        Self {
            file_number,
            offset,
            lsn,
        }
    }
}

impl PartialOrd for LogAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogAnchor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_number
            .cmp(&other.file_number)
            .then(self.offset.cmp(&other.offset))
    }
}

impl fmt::Display for LogAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.file_number, self.offset, self.lsn)
    }
}
