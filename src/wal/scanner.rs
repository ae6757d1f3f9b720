//! Log Scanner
//!
//! Forward-only replay of flushed records.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{LogError, Result};

use super::file_manager::{FileHeader, FileSnapshot};
use super::frame::FrameHeader;
use super::{LogAnchor, UserLogRecord, FILE_HEADER_SIZE, FRAME_HEADER_SIZE};

/// Cursor over the records of a log, in LSN order
///
/// The set of files and the readable length of each one are fixed when the
/// scanner is created: records flushed afterwards are not returned. Each
/// scanner owns its own read handle, independent of the writer.
///
/// After an error the scanner is exhausted.
pub struct LogScanner {
    /// Files to read, ascending by number
    files: Vec<FileSnapshot>,
    /// Index into `files` of the file being read
    index: usize,
    /// Read handle on `files[index]`, opened lazily
    reader: Option<BufReader<File>>,
    /// Offset of the next frame in the current file
    offset: u64,
    /// LSN the next frame must carry
    expected_lsn: u64,
    /// LSN of the last record returned (0 before the first)
    last_lsn: u64,
    /// Position to start from inside the first file, if not its beginning
    start: Option<LogAnchor>,
    /// Files whose tail held an incomplete frame
    truncated: Vec<u64>,
    exhausted: bool,
}

impl LogScanner {
    /// Scan every record in `files` from the beginning
    pub fn new(files: Vec<FileSnapshot>) -> Self {
        Self {
            files,
            index: 0,
            reader: None,
            offset: FILE_HEADER_SIZE,
            expected_lsn: 0,
            last_lsn: 0,
            start: None,
            truncated: Vec::new(),
            exhausted: false,
        }
    }

    /// Scan from the record at `anchor`
    ///
    /// The anchor's file must be part of `files` and its offset must lie
    /// inside the file's readable range.
    pub fn starting_at(files: Vec<FileSnapshot>, anchor: LogAnchor) -> Result<Self> {
        let Some(index) = files.iter().position(|f| f.number == anchor.file_number) else {
            return Err(LogError::Config(format!(
                "anchor {} names a file that is not part of the log",
                anchor
            )));
        };

        let file = &files[index];
        if anchor.offset < FILE_HEADER_SIZE || anchor.offset > file.len {
            return Err(LogError::Config(format!(
                "anchor {} lies outside the flushed range of {} ({} bytes)",
                anchor,
                file.path.display(),
                file.len
            )));
        }

        let mut scanner = Self::new(files);
        scanner.index = index;
        scanner.start = Some(anchor);
        scanner.last_lsn = anchor.lsn.saturating_sub(1);
        Ok(scanner)
    }

    /// Read the next record into `record`
    ///
    /// Returns `Ok(false)` once every file of the snapshot has been read.
    /// A checksum mismatch or an out-of-sequence LSN fails with
    /// [`LogError::Corrupted`] naming the file and the frame offset.
    pub fn get_next_record(&mut self, record: &mut UserLogRecord) -> Result<bool> {
        match self.read_next(record) {
            Ok(found) => Ok(found),
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    /// LSN of the most recently returned record (0 before the first)
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    /// File numbers whose tail held an incomplete frame, in scan order
    pub fn truncated_files(&self) -> &[u64] {
        &self.truncated
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn read_next(&mut self, record: &mut UserLogRecord) -> Result<bool> {
        loop {
            if self.exhausted {
                return Ok(false);
            }
            if self.index >= self.files.len() {
                self.finish();
                return Ok(false);
            }

            let (number, file_len) = (self.files[self.index].number, self.files[self.index].len);
            let mut reader = match self.reader.take() {
                Some(reader) => reader,
                None => self.open_current()?,
            };

            if self.offset + FRAME_HEADER_SIZE as u64 > file_len {
                if self.offset < file_len {
                    self.note_truncated(number, file_len);
                }
                self.next_file();
                continue;
            }

            let mut raw = [0u8; FRAME_HEADER_SIZE];
            reader.read_exact(&mut raw)?;
            let frame = FrameHeader::decode(&raw);

            if self.offset + frame.frame_len() > file_len {
                self.note_truncated(number, file_len);
                self.next_file();
                continue;
            }

            record.read_from(&mut reader, frame.length as usize)?;

            if !frame.verify(record.data()) {
                record.clear();
                return Err(LogError::corrupted(
                    &self.files[self.index].path,
                    self.offset,
                    format!("checksum mismatch on frame with LSN {}", frame.lsn),
                ));
            }

            if frame.lsn != self.expected_lsn {
                record.clear();
                return Err(LogError::corrupted(
                    &self.files[self.index].path,
                    self.offset,
                    format!("expected LSN {}, found {}", self.expected_lsn, frame.lsn),
                ));
            }

            record.set_anchor(LogAnchor::new(number, self.offset, frame.lsn));
            self.offset += frame.frame_len();
            self.last_lsn = frame.lsn;
            self.expected_lsn = frame.lsn + 1;
            self.reader = Some(reader);
            return Ok(true);
        }
    }

    /// Open `files[index]`, check its header and seek to the first frame
    fn open_current(&mut self) -> Result<BufReader<File>> {
        let snapshot = &self.files[self.index];
        let mut reader = BufReader::new(File::open(&snapshot.path)?);
        let header = FileHeader::read_from(&mut reader, &snapshot.path)?;

        if header.file_number != snapshot.number {
            return Err(LogError::invalid_file(
                &snapshot.path,
                format!("header names file {}", header.file_number),
            ));
        }

        match self.start.take() {
            Some(anchor) => {
                reader.seek(SeekFrom::Start(anchor.offset))?;
                self.offset = anchor.offset;
                self.expected_lsn = anchor.lsn;
            }
            None => {
                if header.base_lsn <= self.last_lsn {
                    return Err(LogError::corrupted(
                        &snapshot.path,
                        0,
                        format!(
                            "base LSN {} does not follow LSN {}",
                            header.base_lsn, self.last_lsn
                        ),
                    ));
                }
                self.offset = FILE_HEADER_SIZE;
                self.expected_lsn = header.base_lsn;
            }
        }

        debug!(file = snapshot.number, offset = self.offset, "Scanning log file");
        Ok(reader)
    }

    fn note_truncated(&mut self, number: u64, file_len: u64) {
        debug!(
            file = number,
            offset = self.offset,
            file_len,
            "Incomplete frame at end of log file, treating as end of file"
        );
        self.truncated.push(number);
    }

    fn next_file(&mut self) {
        self.reader = None;
        self.index += 1;
        self.offset = FILE_HEADER_SIZE;
    }

    fn finish(&mut self) {
        self.reader = None;
        self.exhausted = true;
    }
}

impl Iterator for LogScanner {
    type Item = Result<UserLogRecord>;

    /// Allocates a record per item; use `get_next_record` to reuse one buffer.
    fn next(&mut self) -> Option<Self::Item> {
        let mut record = UserLogRecord::new();
        match self.get_next_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
