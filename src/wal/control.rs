//! Control File
//!
//! Persists the checkpoint anchor: the point from which recovery replays.
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────────┐
//! │ BodyLen u32  │ BodyCRC u32  │ LogAnchor (bincode)     │
//! └──────────────┴──────────────┴─────────────────────────┘
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LogError, Result};

use super::file_manager::sync_dir;
use super::LogAnchor;

/// Control file prefix; the log suffix is appended (`control.log`)
const CONTROL_FILE_STEM: &str = "control";

/// BodyLen (4) + BodyCRC (4)
const CONTROL_HEADER_SIZE: usize = 8;

/// Handle on `<log_dir>/control.<suffix>`
#[derive(Debug, Clone)]
pub struct ControlFile {
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl ControlFile {
    pub fn new(dir: &Path, suffix: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            path: dir.join(format!("{}.{}", CONTROL_FILE_STEM, suffix)),
            tmp_path: dir.join(format!("{}.{}.tmp", CONTROL_FILE_STEM, suffix)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored anchor
    ///
    /// Writes a temporary file, syncs it and renames it over the old one, so
    /// a crash leaves either the old or the new anchor in place.
    pub fn write(&self, anchor: &LogAnchor) -> Result<()> {
        let body = bincode::serialize(anchor)?;

        let mut bytes = Vec::with_capacity(CONTROL_HEADER_SIZE + body.len());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        bytes.extend_from_slice(&body);

        {
            let mut file = File::create(&self.tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&self.tmp_path, &self.path)?;
        sync_dir(&self.dir)?;

        debug!(anchor = %anchor, path = %self.path.display(), "Wrote checkpoint anchor");
        Ok(())
    }

    /// Read the stored anchor, `None` if no checkpoint was ever written
    pub fn read(&self) -> Result<Option<LogAnchor>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < CONTROL_HEADER_SIZE {
            return Err(LogError::Control(format!(
                "{} is truncated ({} bytes)",
                self.path.display(),
                bytes.len()
            )));
        }

        let (header, body) = bytes.split_at(CONTROL_HEADER_SIZE);
        let body_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let stored_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if body.len() != body_len {
            return Err(LogError::Control(format!(
                "{} declares {} body bytes but holds {}",
                self.path.display(),
                body_len,
                body.len()
            )));
        }
        if crc32fast::hash(body) != stored_crc {
            return Err(LogError::Control(format!(
                "{} failed its checksum",
                self.path.display()
            )));
        }

        Ok(Some(bincode::deserialize(body)?))
    }
}
