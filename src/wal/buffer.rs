//! Log Buffer
//!
//! In-memory accumulation area in front of the active log file.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame;

/// Batches framed records before a physical write
///
/// Invariant: `len() <= capacity()`. Bytes held here are invisible to
/// scanners and lost on crash until drained into a log file.
#[derive(Debug)]
pub struct LogBuffer {
    /// Pending frame bytes, in append order
    buf: BytesMut,
    /// Hard limit on `buf.len()`
    capacity: usize,
    /// Number of frames currently buffered
    frames: usize,
}

impl LogBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            frames: 0,
        }
    }

    /// Append already-framed bytes
    ///
    /// Returns `false` without touching the buffer when the bytes do not fit
    /// in the remaining capacity; the caller must drain first.
    pub fn append(&mut self, frame_bytes: &[u8]) -> bool {
        if frame_bytes.len() > self.remaining() {
            return false;
        }
        self.buf.put_slice(frame_bytes);
        self.frames += 1;
        true
    }

    /// Frame `payload` under `lsn` directly into the buffer
    ///
    /// Same contract as [`append`](Self::append), without an intermediate copy.
    pub fn append_record(&mut self, lsn: u64, payload: &[u8]) -> bool {
        if frame::encoded_len(payload.len()) > self.remaining() {
            return false;
        }
        frame::encode_into(&mut self.buf, lsn, payload);
        self.frames += 1;
        true
    }

    /// Take all buffered bytes, leaving the buffer empty
    pub fn drain(&mut self) -> Bytes {
        self.frames = 0;
        let drained = self.buf.split().freeze();
        // split() hands the allocation to the drained half; reserve a fresh one
        self.buf.reserve(self.capacity);
        drained
    }

    /// Put drained bytes back after a failed write
    ///
    /// Only valid on an empty buffer, with bytes that came out of `drain`.
    pub(crate) fn restore(&mut self, bytes: &[u8], frames: usize) {
        debug_assert!(self.buf.is_empty());
        self.buf.put_slice(bytes);
        self.frames = frames;
    }

    /// Drop every frame appended after the buffer held `len` bytes in `frames` frames
    pub(crate) fn truncate(&mut self, len: usize, frames: usize) {
        self.buf.truncate(len);
        self.frames = frames.min(self.frames);
    }

    /// Buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of buffered frames
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available before a drain is required
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }
}
