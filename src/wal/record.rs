//! User log records
//!
//! The caller-owned container handed to `Log::log` and filled by
//! `LogScanner::get_next_record`.

use std::io::Read;

use super::LogAnchor;

/// A reusable payload container
///
/// The backing buffer only grows: reading a shorter record into it keeps the
/// allocation, so one record can be reused across a whole scan without
/// allocating per record.
#[derive(Debug, Clone, Default)]
pub struct UserLogRecord {
    /// Backing storage, at least `length` bytes long
    data: Vec<u8>,
    /// Number of meaningful bytes in `data`
    length: usize,
    /// Position of the record last read into this container
    anchor: Option<LogAnchor>,
}

impl UserLogRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` payload bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            length: 0,
            anchor: None,
        }
    }

    /// Create a record holding a copy of `payload`
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut record = Self::new();
        record.set_data(payload);
        record
    }

    /// Replace the payload with a copy of `payload`
    pub fn set_data(&mut self, payload: &[u8]) {
        self.ensure_capacity(payload.len());
        self.data[..payload.len()].copy_from_slice(payload);
        self.length = payload.len();
        self.anchor = None;
    }

    /// The payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Payload length in bytes
    pub fn data_length(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Size of the backing buffer (may exceed the payload length)
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Where the record was read from, if it came out of a scanner
    pub fn anchor(&self) -> Option<LogAnchor> {
        self.anchor
    }

    pub fn clear(&mut self) {
        self.length = 0;
        self.anchor = None;
    }

    /// Fill the record with `len` bytes from `reader`
    pub(crate) fn read_from<R: Read>(&mut self, reader: &mut R, len: usize) -> std::io::Result<()> {
        self.ensure_capacity(len);
        // Reset first so a failed read never leaves a half-filled payload visible
        self.length = 0;
        self.anchor = None;
        reader.read_exact(&mut self.data[..len])?;
        self.length = len;
        Ok(())
    }

    pub(crate) fn set_anchor(&mut self, anchor: LogAnchor) {
        self.anchor = Some(anchor);
    }

    fn ensure_capacity(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
    }
}
