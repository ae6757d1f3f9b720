//! Log File Manager
//!
//! Owns the numbered log files of one log directory.
//!
//! ## Responsibilities
//! - Discover existing files on startup and validate their headers
//! - Append frame bytes to the active file
//! - Seal the active file and rotate when the size cap would be exceeded
//! - Recover the next LSN and cut off a torn tail in the active file

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{LogError, Result};

use super::frame::FrameHeader;
use super::{FILE_HEADER_SIZE, FIRST_LSN, FRAME_HEADER_SIZE, MAGIC, VERSION};

/// Lifecycle state of a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Current write target
    Active,
    /// Full, synced and never written again
    Sealed,
}

/// Bookkeeping for one log file
#[derive(Debug, Clone)]
pub struct LogFile {
    /// Sequence number encoded in the file name
    pub number: u64,
    /// Full path on disk
    pub path: PathBuf,
    /// Bytes written so far, header included (the write offset)
    pub len: u64,
    /// LSN of the first frame stored in this file
    pub base_lsn: u64,
    pub state: FileState,
}

/// Immutable view of one file for a scanner: only bytes below `len` are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub number: u64,
    pub path: PathBuf,
    pub len: u64,
}

// =============================================================================
// File Header
// =============================================================================

/// The 32-byte header at the start of every log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub file_number: u64,
    pub base_lsn: u64,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&VERSION.to_le_bytes());
        // [6..8] reserved
        buf[8..16].copy_from_slice(&self.file_number.to_le_bytes());
        buf[16..24].copy_from_slice(&self.base_lsn.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..24]);
        buf[24..28].copy_from_slice(&crc.to_le_bytes());
        // [28..32] padding
        buf
    }

    /// Decode and validate a header read from `path`
    pub fn decode(buf: &[u8; FILE_HEADER_SIZE as usize], path: &Path) -> Result<Self> {
        if &buf[0..4] != MAGIC {
            return Err(LogError::invalid_file(
                path,
                format!("bad magic {:?}", &buf[0..4]),
            ));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(LogError::invalid_file(
                path,
                format!("unsupported format version {}", version),
            ));
        }

        let stored_crc = le_u32(&buf[24..28]);
        let actual_crc = crc32fast::hash(&buf[0..24]);
        if stored_crc != actual_crc {
            return Err(LogError::invalid_file(
                path,
                format!(
                    "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                    stored_crc, actual_crc
                ),
            ));
        }

        Ok(Self {
            file_number: le_u64(&buf[8..16]),
            base_lsn: le_u64(&buf[16..24]),
        })
    }

    /// Read and validate the header at the current position of `reader`
    pub fn read_from<R: Read>(reader: &mut R, path: &Path) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        match reader.read_exact(&mut buf) {
            Ok(()) => Self::decode(&buf, path),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(LogError::invalid_file(path, "file is shorter than its header"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Log File Manager
// =============================================================================

/// Manages the set of log files in one directory
///
/// Exactly one file is active; every lower-numbered file is sealed. The
/// manager holds the only write handle, owned by value, so it is closed on
/// drop or when a rotation replaces it.
pub struct LogFileManager {
    /// Directory holding the files
    dir: PathBuf,
    /// File extension, without the dot
    suffix: String,
    /// Maximum file size, header included
    size_cap: u64,
    /// Sealed files, ascending by number
    sealed: Vec<LogFile>,
    /// The current write target
    active: LogFile,
    /// Append handle on the active file
    handle: File,
    /// LSN following the last valid frame found at open
    recovered_next_lsn: u64,
    #[cfg(test)]
    pub(crate) faults: Faults,
}

/// Injected I/O failures for unit tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub(crate) fail_writes: bool,
    pub(crate) fail_syncs: bool,
}

impl LogFileManager {
    /// Open or create the file set in `dir`
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Discover files named `<number>.<suffix>`
    /// 3. Validate numbering, headers and sizes
    /// 4. Walk the active file's frames, truncating a torn tail
    /// 5. Create file 0 when the directory holds no log yet
    pub fn open(dir: &Path, suffix: &str, size_cap: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let discovered = Self::discover(dir, suffix)?;

        let Some((last, rest)) = discovered.split_last() else {
            let path = dir.join(Self::file_name(0, suffix));
            let handle = Self::create_file(&path, 0, FIRST_LSN)?;
            info!(path = %path.display(), "Created first log file");
            return Ok(Self {
                dir: dir.to_path_buf(),
                suffix: suffix.to_string(),
                size_cap,
                sealed: Vec::new(),
                active: LogFile {
                    number: 0,
                    path,
                    len: FILE_HEADER_SIZE,
                    base_lsn: FIRST_LSN,
                    state: FileState::Active,
                },
                handle,
                recovered_next_lsn: FIRST_LSN,
                #[cfg(test)]
                faults: Faults::default(),
            });
        };

        // Numbers must be contiguous; the first one may be above zero
        let first = discovered[0].number;
        for (i, snapshot) in discovered.iter().enumerate() {
            if snapshot.number != first + i as u64 {
                return Err(LogError::Config(format!(
                    "gap in log file numbering: expected file {}, found {}",
                    first + i as u64,
                    snapshot.number
                )));
            }
        }

        let mut sealed = Vec::with_capacity(rest.len());
        let mut previous_base: Option<u64> = None;
        for snapshot in rest {
            let file = Self::load_file(snapshot, size_cap, previous_base, FileState::Sealed)?;
            previous_base = Some(file.base_lsn);
            sealed.push(file);
        }

        let mut active = Self::load_file(last, size_cap, previous_base, FileState::Active)?;
        let (valid_end, next_lsn) = Self::recover_tail(&active)?;

        if valid_end < active.len {
            warn!(
                path = %active.path.display(),
                valid_end,
                file_len = active.len,
                "Truncating torn tail of active log file"
            );
            let file = OpenOptions::new().write(true).open(&active.path)?;
            file.set_len(valid_end)?;
            file.sync_all()?;
            active.len = valid_end;
        }

        let handle = OpenOptions::new().append(true).open(&active.path)?;

        debug!(
            dir = %dir.display(),
            sealed = sealed.len(),
            active = active.number,
            next_lsn,
            "Discovered log files"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
            size_cap,
            sealed,
            active,
            handle,
            recovered_next_lsn: next_lsn,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// List the log files in `dir`, ascending by number, with their sizes
    ///
    /// Files not matching `<number>.<suffix>` are ignored.
    pub fn discover(dir: &Path, suffix: &str) -> Result<Vec<FileSnapshot>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name();
            if let Some(number) = Self::parse_file_number(&name.to_string_lossy(), suffix) {
                files.push(FileSnapshot {
                    number,
                    path,
                    len: entry.metadata()?.len(),
                });
            }
        }

        files.sort_by_key(|f| f.number);
        Ok(files)
    }

    /// Canonical file name: `0000000000000007.log`
    pub fn file_name(number: u64, suffix: &str) -> String {
        format!("{:016}.{}", number, suffix)
    }

    /// Parse the file number out of a log file name
    pub fn parse_file_number(name: &str, suffix: &str) -> Option<u64> {
        let stem = name.strip_suffix(suffix)?.strip_suffix('.')?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append whole frames to the active file
    ///
    /// Rotates first when the bytes would push the active file past its cap.
    /// `bytes` must start at a frame boundary; the first frame's LSN becomes
    /// the base LSN of a newly created file.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let size = bytes.len() as u64;
        if size > self.max_write_size() {
            return Err(LogError::Config(format!(
                "write of {} bytes can never fit in a log file capped at {} bytes",
                size, self.size_cap
            )));
        }

        if self.would_overflow(size) {
            let header = FrameHeader::peek(bytes).ok_or_else(|| {
                LogError::Config("write does not start with a complete frame header".into())
            })?;
            self.rotate(header.lsn)?;
        }

        #[cfg(test)]
        if self.faults.fail_writes {
            return Err(std::io::Error::new(ErrorKind::Other, "injected write failure").into());
        }

        if let Err(e) = self.handle.write_all(bytes) {
            // Cut off whatever part of the write landed so the next append
            // starts on a frame boundary again
            if let Err(rollback) = self.handle.set_len(self.active.len) {
                warn!(
                    path = %self.active.path.display(),
                    error = %rollback,
                    "Failed to roll back partial log write"
                );
            }
            return Err(e.into());
        }
        self.active.len += size;

        Ok(())
    }

    /// Force the active file's written bytes to stable storage
    pub fn force_durable(&mut self) -> Result<()> {
        #[cfg(test)]
        if self.faults.fail_syncs {
            return Err(std::io::Error::new(ErrorKind::Other, "injected sync failure").into());
        }

        self.handle.sync_data()?;
        Ok(())
    }

    /// Seal the active file and make a new file, starting at `base_lsn`, active
    ///
    /// The old handle stays active until the new file exists with a complete
    /// header, so a failure leaves the manager unchanged.
    pub fn rotate(&mut self, base_lsn: u64) -> Result<()> {
        self.handle.sync_all()?;

        let number = self.active.number + 1;
        let path = self.dir.join(Self::file_name(number, &self.suffix));
        let handle = Self::create_file(&path, number, base_lsn)?;

        info!(
            sealed = %self.active.path.display(),
            sealed_len = self.active.len,
            active = %path.display(),
            base_lsn,
            "Rotated log file"
        );

        let mut previous = std::mem::replace(
            &mut self.active,
            LogFile {
                number,
                path,
                len: FILE_HEADER_SIZE,
                base_lsn,
                state: FileState::Active,
            },
        );
        previous.state = FileState::Sealed;
        self.sealed.push(previous);
        self.handle = handle;

        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether `extra` more bytes would push the active file past its cap
    pub fn would_overflow(&self, extra: u64) -> bool {
        self.active.len + extra > self.size_cap
    }

    /// Largest write that fits in an empty file
    pub fn max_write_size(&self) -> u64 {
        self.size_cap - FILE_HEADER_SIZE
    }

    pub fn active(&self) -> &LogFile {
        &self.active
    }

    /// Sealed files in ascending sequence order
    pub fn list_sealed_files_in_order(&self) -> &[LogFile] {
        &self.sealed
    }

    /// All files, sealed first, active last
    pub fn files(&self) -> impl Iterator<Item = &LogFile> {
        self.sealed.iter().chain(std::iter::once(&self.active))
    }

    /// Current written length of every file, for a scanner
    pub fn snapshot(&self) -> Vec<FileSnapshot> {
        self.files()
            .map(|f| FileSnapshot {
                number: f.number,
                path: f.path.clone(),
                len: f.len,
            })
            .collect()
    }

    /// LSN that follows the last valid frame found when the log was opened
    pub fn recovered_next_lsn(&self) -> u64 {
        self.recovered_next_lsn
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn size_cap(&self) -> u64 {
        self.size_cap
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Create a new file and write its header
    ///
    /// Removes the file again if the header cannot be written, so no
    /// headerless file is left behind for the next open to trip over.
    fn create_file(path: &Path, number: u64, base_lsn: u64) -> Result<File> {
        let mut file = OpenOptions::new().create_new(true).append(true).open(path)?;

        let header = FileHeader {
            file_number: number,
            base_lsn,
        };
        let written = file
            .write_all(&header.encode())
            .and_then(|_| file.sync_all());

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove half-created log file");
            }
            return Err(e.into());
        }

        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }

        Ok(file)
    }

    /// Validate one discovered file against the configuration and its predecessor
    fn load_file(
        snapshot: &FileSnapshot,
        size_cap: u64,
        previous_base: Option<u64>,
        state: FileState,
    ) -> Result<LogFile> {
        let mut file = File::open(&snapshot.path)?;
        let header = FileHeader::read_from(&mut file, &snapshot.path)?;

        if header.file_number != snapshot.number {
            return Err(LogError::invalid_file(
                &snapshot.path,
                format!(
                    "header names file {} but the file name says {}",
                    header.file_number, snapshot.number
                ),
            ));
        }

        if snapshot.len > size_cap {
            return Err(LogError::Config(format!(
                "log file {} is {} bytes, larger than the configured cap of {}",
                snapshot.path.display(),
                snapshot.len,
                size_cap
            )));
        }

        if let Some(previous) = previous_base {
            if header.base_lsn < previous {
                return Err(LogError::invalid_file(
                    &snapshot.path,
                    format!(
                        "base LSN {} goes backwards from the previous file's {}",
                        header.base_lsn, previous
                    ),
                ));
            }
        }

        Ok(LogFile {
            number: snapshot.number,
            path: snapshot.path.clone(),
            len: snapshot.len,
            base_lsn: header.base_lsn,
            state,
        })
    }

    /// Walk the frames of `file` and find where valid data ends
    ///
    /// Returns `(valid_end, next_lsn)`. An incomplete last frame, or a last
    /// frame that fails its checksum and ends exactly at end of file, is a
    /// torn write. A bad frame followed by more data is corruption.
    fn recover_tail(file: &LogFile) -> Result<(u64, u64)> {
        let mut reader = BufReader::new(File::open(&file.path)?);
        reader.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;

        let mut offset = FILE_HEADER_SIZE;
        let mut expected_lsn = file.base_lsn;
        let mut payload = Vec::new();

        while offset + FRAME_HEADER_SIZE as u64 <= file.len {
            let mut raw = [0u8; FRAME_HEADER_SIZE];
            reader.read_exact(&mut raw)?;
            let frame = FrameHeader::decode(&raw);

            let frame_end = offset + frame.frame_len();
            if frame_end > file.len {
                break;
            }

            payload.resize(frame.length as usize, 0);
            reader.read_exact(&mut payload)?;

            if !frame.verify(&payload) {
                if frame_end == file.len {
                    break;
                }
                return Err(LogError::corrupted(
                    &file.path,
                    offset,
                    format!("checksum mismatch on frame with LSN {}", frame.lsn),
                ));
            }

            if frame.lsn != expected_lsn {
                return Err(LogError::corrupted(
                    &file.path,
                    offset,
                    format!("expected LSN {}, found {}", expected_lsn, frame.lsn),
                ));
            }

            expected_lsn += 1;
            offset = frame_end;
        }

        Ok((offset, expected_lsn))
    }
}

/// Fsync a directory so newly created or renamed entries survive a crash
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
