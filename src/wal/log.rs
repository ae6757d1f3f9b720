//! Log façade
//!
//! Coordinates the buffer, the file manager, the flusher and scanners.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{LogConfig, ScanVisibility, SyncStrategy};
use crate::error::{LogError, Result};

use super::flusher::Flusher;
use super::frame;
use super::{
    ControlFile, LogAnchor, LogBuffer, LogFileManager, LogScanner, UserLogRecord,
    FRAME_HEADER_SIZE,
};

/// Mutable log state, only ever touched under the writer lock
pub(crate) struct LogWriter {
    /// `None` once the log has been destroyed
    files: Option<LogFileManager>,
    buffer: LogBuffer,
    /// LSN the next appended record receives
    next_lsn: u64,
    sync_strategy: SyncStrategy,
}

impl LogWriter {
    fn files(&self) -> Result<&LogFileManager> {
        self.files.as_ref().ok_or(LogError::Closed)
    }

    fn files_mut(&mut self) -> Result<&mut LogFileManager> {
        self.files.as_mut().ok_or(LogError::Closed)
    }

    /// Frame `payload` into the buffer, flushing and rotating as needed
    ///
    /// A frame larger than the whole buffer bypasses it and goes straight
    /// to the active file. Only a frame that cannot fit an empty file is
    /// rejected.
    fn append(&mut self, payload: &[u8], force_durable: bool) -> Result<LogAnchor> {
        let max_frame = self.files()?.max_write_size();
        let frame_len = frame::encoded_len(payload.len());
        if frame_len as u64 > max_frame {
            return Err(LogError::RecordTooLarge {
                size: payload.len(),
                max: (max_frame as usize).saturating_sub(FRAME_HEADER_SIZE),
            });
        }

        if frame_len > self.buffer.capacity() {
            return self.append_direct(payload, force_durable);
        }

        // Decide on rotation here, while the buffer still holds whole frames
        // that all belong to the active file
        let pending = (self.buffer.len() + frame_len) as u64;
        if self.files()?.would_overflow(pending) {
            self.flush(false)?;
            let base_lsn = self.next_lsn;
            self.files_mut()?.rotate(base_lsn)?;
        } else if frame_len > self.buffer.remaining() {
            self.flush(false)?;
        }

        let active = self.files()?.active();
        let anchor = LogAnchor::new(
            active.number,
            active.len + self.buffer.len() as u64,
            self.next_lsn,
        );

        let (mark_len, mark_frames) = (self.buffer.len(), self.buffer.frame_count());
        if !self.buffer.append_record(self.next_lsn, payload) {
            // Unreachable while frame_len <= capacity and the buffer was just drained
            return Err(LogError::RecordTooLarge {
                size: payload.len(),
                max: self.buffer.remaining().saturating_sub(FRAME_HEADER_SIZE),
            });
        }
        self.next_lsn += 1;

        if force_durable {
            if let Err(e) = self.write_buffer() {
                // The caller sees a failure, so no later flush may write this record
                self.buffer.truncate(mark_len, mark_frames);
                self.next_lsn -= 1;
                return Err(e);
            }
            self.sync_files()?;
        }

        Ok(anchor)
    }

    /// Write one oversized frame straight to the active file
    ///
    /// Buffered frames go first so LSN order on disk is kept.
    fn append_direct(&mut self, payload: &[u8], force_durable: bool) -> Result<LogAnchor> {
        self.flush(false)?;

        let frame_len = frame::encoded_len(payload.len()) as u64;
        let lsn = self.next_lsn;
        if self.files()?.would_overflow(frame_len) {
            self.files_mut()?.rotate(lsn)?;
        }

        let bytes = frame::encode_frame(lsn, payload);
        let files = self.files_mut()?;
        let anchor = LogAnchor::new(files.active().number, files.active().len, lsn);

        // A failed write is rolled back by the file manager and uses no LSN
        files.write_frame(&bytes)?;
        self.next_lsn += 1;

        debug!(lsn, bytes = bytes.len(), anchor = %anchor, "Wrote unbuffered log record");

        if force_durable || self.sync_strategy == SyncStrategy::EveryFlush {
            self.sync_files()?;
        }
        Ok(anchor)
    }

    /// Write buffered frames to the active file
    ///
    /// Syncs when `sync` is set or the strategy asks for it. On a failed
    /// write the frames go back into the buffer so no LSN is lost.
    pub(crate) fn flush(&mut self, sync: bool) -> Result<()> {
        let sync = sync || self.sync_strategy == SyncStrategy::EveryFlush;
        self.write_buffer()?;
        if sync {
            self.sync_files()?;
        }
        Ok(())
    }

    fn write_buffer(&mut self) -> Result<()> {
        let files = self.files.as_mut().ok_or(LogError::Closed)?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        let frames = self.buffer.frame_count();
        let bytes = self.buffer.drain();

        if let Err(e) = files.write_frame(&bytes) {
            self.buffer.restore(&bytes, frames);
            return Err(e);
        }

        debug!(
            bytes = bytes.len(),
            frames,
            file = files.active().number,
            offset = files.active().len,
            "Flushed log buffer"
        );
        Ok(())
    }

    /// Force written frames to stable storage
    ///
    /// A failed sync closes the log: what reached the disk is unknown, so
    /// no later call may report success on top of it.
    fn sync_files(&mut self) -> Result<()> {
        let files = self.files.as_mut().ok_or(LogError::Closed)?;
        if let Err(e) = files.force_durable() {
            error!(error = %e, dir = %files.dir().display(), "Log sync failed, closing log");
            self.files = None;
            return Err(e);
        }
        Ok(())
    }
}

/// A write-ahead log over a directory of numbered files
///
/// ## Concurrency Model: Single Writer
///
/// - **Appends** (`log`, `sync`, rotation, `destroy`): serialized by one
///   mutex around the buffer and the file manager
/// - **Scans**: take the mutex only to snapshot file lengths, then read
///   through their own handles without locking
///
/// ## Durability
///
/// Only flushed bytes are scannable, and only synced bytes survive a crash.
/// An unforced append may stay in the buffer until the buffer fills, a
/// rotation happens, `sync` is called, the background flusher runs, or the
/// log is destroyed.
pub struct Log {
    config: LogConfig,
    writer: Arc<Mutex<LogWriter>>,
    flusher: Mutex<Option<Flusher>>,
    control: ControlFile,
}

impl Log {
    /// Open or create a log with default policies
    pub fn init(
        dir: impl AsRef<Path>,
        suffix: &str,
        buffer_size: usize,
        file_size_cap: u64,
    ) -> Result<Self> {
        let config = LogConfig::builder()
            .log_dir(dir.as_ref())
            .suffix(suffix)
            .buffer_size(buffer_size)
            .file_size_cap(file_size_cap)
            .build();
        Self::open(config)
    }

    /// Open or create a log with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Open the file set, recovering the next LSN
    /// 3. Start the background flusher if an interval is configured
    pub fn open(config: LogConfig) -> Result<Self> {
        config.validate()?;

        let files = LogFileManager::open(&config.log_dir, &config.suffix, config.file_size_cap)?;
        let next_lsn = files.recovered_next_lsn();

        info!(
            dir = %config.log_dir.display(),
            active_file = files.active().number,
            sealed_files = files.list_sealed_files_in_order().len(),
            next_lsn,
            "Opened log"
        );

        let writer = Arc::new(Mutex::new(LogWriter {
            files: Some(files),
            buffer: LogBuffer::new(config.buffer_size),
            next_lsn,
            sync_strategy: config.sync_strategy,
        }));

        let flusher = match config.flush_interval {
            Some(interval) => Some(Flusher::spawn(Arc::clone(&writer), interval)?),
            None => None,
        };

        let control = ControlFile::new(&config.log_dir, &config.suffix);

        Ok(Self {
            config,
            writer,
            flusher: Mutex::new(flusher),
            control,
        })
    }

    /// Append a record
    ///
    /// With `force_durable` the record, and everything buffered before it,
    /// is written and synced before this returns. Without it the record may
    /// stay in memory: invisible to scanners and lost on crash.
    ///
    /// A record whose frame is larger than the buffer is written to the
    /// active file at once. A failed forced append leaves nothing behind for
    /// a later flush; a failed sync closes the log.
    pub fn log(&self, record: &UserLogRecord, force_durable: bool) -> Result<LogAnchor> {
        self.writer.lock().append(record.data(), force_durable)
    }

    /// Write and sync everything buffered; a no-op flush when nothing is
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().flush(true)
    }

    /// Scan all records from the oldest file
    ///
    /// Buffered records are included only under
    /// [`ScanVisibility::FlushOnScan`].
    pub fn begin_scan(&self) -> Result<LogScanner> {
        let snapshot = {
            let mut writer = self.writer.lock();
            if self.config.scan_visibility == ScanVisibility::FlushOnScan {
                writer.flush(false)?;
            }
            writer.files()?.snapshot()
        };
        Ok(LogScanner::new(snapshot))
    }

    /// Scan from the record at `anchor`
    pub fn begin_scan_from(&self, anchor: LogAnchor) -> Result<LogScanner> {
        let snapshot = {
            let mut writer = self.writer.lock();
            if self.config.scan_visibility == ScanVisibility::FlushOnScan {
                writer.flush(false)?;
            }
            writer.files()?.snapshot()
        };
        LogScanner::starting_at(snapshot, anchor)
    }

    /// Scan from the stored checkpoint, or from the start if there is none
    pub fn begin_scan_from_checkpoint(&self) -> Result<LogScanner> {
        match self.checkpoint_anchor()? {
            Some(anchor) => self.begin_scan_from(anchor),
            None => self.begin_scan(),
        }
    }

    /// Record `anchor` as the point recovery should replay from
    ///
    /// Syncs the log first so the anchored record is durable before the
    /// control file names it.
    pub fn checkpoint(&self, anchor: LogAnchor) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            if anchor.lsn >= writer.next_lsn {
                return Err(LogError::Config(format!(
                    "checkpoint anchor {} is beyond the last appended LSN {}",
                    anchor,
                    writer.next_lsn - 1
                )));
            }
            writer.flush(true)?;
        }
        self.control.write(&anchor)?;
        info!(anchor = %anchor, "Checkpoint recorded");
        Ok(())
    }

    /// The stored checkpoint anchor, if any
    pub fn checkpoint_anchor(&self) -> Result<Option<LogAnchor>> {
        self.control.read()
    }

    /// Flush, sync and close the log
    ///
    /// Every later operation fails with [`LogError::Closed`]. Calling it
    /// again is a no-op.
    pub fn destroy(&self) -> Result<()> {
        // Stop the flusher before taking the writer lock it competes for
        if let Some(mut flusher) = self.flusher.lock().take() {
            flusher.stop();
        }

        let mut writer = self.writer.lock();
        if writer.files.is_none() {
            return Ok(());
        }

        writer.flush(true)?;
        if let Some(files) = writer.files.take() {
            info!(
                dir = %files.dir().display(),
                active_file = files.active().number,
                next_lsn = writer.next_lsn,
                "Closed log"
            );
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// LSN the next appended record will receive
    pub fn next_lsn(&self) -> u64 {
        self.writer.lock().next_lsn
    }

    /// Number of the active file, `None` once closed
    pub fn active_file_number(&self) -> Option<u64> {
        self.writer.lock().files.as_ref().map(|f| f.active().number)
    }

    /// Bytes appended but not yet written to a file
    pub fn buffered_bytes(&self) -> usize {
        self.writer.lock().buffer.len()
    }

    /// Number of records appended but not yet written to a file
    pub fn buffered_records(&self) -> usize {
        self.writer.lock().buffer.frame_count()
    }

    pub fn is_closed(&self) -> bool {
        self.writer.lock().files.is_none()
    }

    pub fn dir(&self) -> &Path {
        &self.config.log_dir
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!(error = %e, "Failed to flush log on drop; buffered records are lost");
        }
    }
}
