//! Tests for LogFileManager
//!
//! These tests verify:
//! - Creating and rediscovering the file set
//! - File naming
//! - Rotation and sealing
//! - Validation of existing files on open
//! - Torn-tail recovery of the active file

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dirwal::wal::{
    encode_frame, FileHeader, FileState, LogFileManager, FILE_HEADER_SIZE, FIRST_LSN,
};
use dirwal::LogError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const SUFFIX: &str = "log";

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal");
    (temp_dir, path)
}

fn file_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(LogFileManager::file_name(number, SUFFIX))
}

fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&byte).unwrap();
    file.sync_all().unwrap();
}

/// Write frames with LSNs 1..=count, each carrying a 10-byte payload
fn write_frames(dir: &Path, count: u64) {
    let mut manager = LogFileManager::open(dir, SUFFIX, 1024 * 1024).unwrap();
    for lsn in 1..=count {
        manager.write_frame(&encode_frame(lsn, &[lsn as u8; 10])).unwrap();
    }
    manager.force_durable().unwrap();
}

/// 26 bytes per frame with a 10-byte payload
const SMALL_FRAME: u64 = 26;

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory_and_first_file() {
    let (_temp, dir) = setup_temp_dir();
    assert!(!dir.exists());

    let manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    assert!(dir.is_dir());
    assert!(file_path(&dir, 0).is_file());
    assert_eq!(manager.active().number, 0);
    assert_eq!(manager.active().len, FILE_HEADER_SIZE);
    assert_eq!(manager.active().state, FileState::Active);
    assert_eq!(manager.active().base_lsn, FIRST_LSN);
    assert_eq!(manager.recovered_next_lsn(), FIRST_LSN);
    assert!(manager.list_sealed_files_in_order().is_empty());
}

#[test]
fn test_first_file_has_valid_header() {
    let (_temp, dir) = setup_temp_dir();
    LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    let mut file = File::open(file_path(&dir, 0)).unwrap();
    let header = FileHeader::read_from(&mut file, &file_path(&dir, 0)).unwrap();

    assert_eq!(header.file_number, 0);
    assert_eq!(header.base_lsn, FIRST_LSN);
    assert_eq!(fs::metadata(file_path(&dir, 0)).unwrap().len(), FILE_HEADER_SIZE);
}

#[test]
fn test_file_name_format() {
    assert_eq!(LogFileManager::file_name(0, "log"), "0000000000000000.log");
    assert_eq!(LogFileManager::file_name(42, "wal"), "0000000000000042.wal");
}

#[test]
fn test_parse_file_number() {
    assert_eq!(LogFileManager::parse_file_number("0000000000000042.log", "log"), Some(42));
    assert_eq!(LogFileManager::parse_file_number("7.log", "log"), Some(7));

    assert_eq!(LogFileManager::parse_file_number("control.log", "log"), None);
    assert_eq!(LogFileManager::parse_file_number("0000000000000042.wal", "log"), None);
    assert_eq!(LogFileManager::parse_file_number("0000000000000042log", "log"), None);
    assert_eq!(LogFileManager::parse_file_number(".log", "log"), None);
    assert_eq!(LogFileManager::parse_file_number("+1.log", "log"), None);
    assert_eq!(LogFileManager::parse_file_number("control.log.tmp", "log"), None);
}

#[test]
fn test_discover_ignores_foreign_files() {
    let (_temp, dir) = setup_temp_dir();
    LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
    File::create(dir.join("control.log")).unwrap();
    File::create(dir.join("readme.txt")).unwrap();
    File::create(dir.join("0000000000000005.other")).unwrap();

    let files = LogFileManager::discover(&dir, SUFFIX).unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].number, 0);
}

// =============================================================================
// Write/Rotate Tests
// =============================================================================

#[test]
fn test_write_frame_advances_offset() {
    let (_temp, dir) = setup_temp_dir();
    let mut manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    manager.write_frame(&encode_frame(1, &[1u8; 10])).unwrap();
    manager.write_frame(&encode_frame(2, &[2u8; 10])).unwrap();

    assert_eq!(manager.active().len, FILE_HEADER_SIZE + 2 * SMALL_FRAME);
    assert_eq!(
        fs::metadata(file_path(&dir, 0)).unwrap().len(),
        FILE_HEADER_SIZE + 2 * SMALL_FRAME
    );
}

#[test]
fn test_write_empty_is_noop() {
    let (_temp, dir) = setup_temp_dir();
    let mut manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    manager.write_frame(&[]).unwrap();

    assert_eq!(manager.active().len, FILE_HEADER_SIZE);
}

#[test]
fn test_write_frame_rotates_when_cap_exceeded() {
    let (_temp, dir) = setup_temp_dir();
    // Room for exactly one 80-byte frame per file
    let mut manager = LogFileManager::open(&dir, SUFFIX, FILE_HEADER_SIZE + 100).unwrap();

    manager.write_frame(&encode_frame(1, &[1u8; 64])).unwrap();
    assert!(!manager.would_overflow(20));
    assert!(manager.would_overflow(80));

    manager.write_frame(&encode_frame(2, &[2u8; 64])).unwrap();

    let sealed = manager.list_sealed_files_in_order();
    assert_eq!(sealed.len(), 1);
    assert_eq!(sealed[0].number, 0);
    assert_eq!(sealed[0].state, FileState::Sealed);
    assert_eq!(sealed[0].len, FILE_HEADER_SIZE + 80);

    assert_eq!(manager.active().number, 1);
    assert_eq!(manager.active().base_lsn, 2);
    assert_eq!(manager.active().len, FILE_HEADER_SIZE + 80);
    assert!(file_path(&dir, 1).is_file());
}

#[test]
fn test_write_larger_than_any_file_is_rejected() {
    let (_temp, dir) = setup_temp_dir();
    let mut manager = LogFileManager::open(&dir, SUFFIX, FILE_HEADER_SIZE + 100).unwrap();

    let result = manager.write_frame(&encode_frame(1, &[0u8; 100]));

    assert!(matches!(result, Err(LogError::Config(_))));
    assert_eq!(manager.active().len, FILE_HEADER_SIZE);
    assert!(manager.list_sealed_files_in_order().is_empty());
}

#[test]
fn test_explicit_rotate() {
    let (_temp, dir) = setup_temp_dir();
    let mut manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
    manager.write_frame(&encode_frame(1, b"a")).unwrap();

    manager.rotate(2).unwrap();
    manager.rotate(2).unwrap();

    let numbers: Vec<u64> = manager.files().map(|f| f.number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert_eq!(manager.active().number, 2);

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].len, FILE_HEADER_SIZE + 17);
    assert_eq!(snapshot[1].len, FILE_HEADER_SIZE);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_recovers_state() {
    let (_temp, dir) = setup_temp_dir();
    {
        let mut manager = LogFileManager::open(&dir, SUFFIX, FILE_HEADER_SIZE + 100).unwrap();
        for lsn in 1..=5 {
            manager.write_frame(&encode_frame(lsn, &[0u8; 64])).unwrap();
        }
    }

    let manager = LogFileManager::open(&dir, SUFFIX, FILE_HEADER_SIZE + 100).unwrap();

    assert_eq!(manager.list_sealed_files_in_order().len(), 4);
    assert!(manager
        .list_sealed_files_in_order()
        .iter()
        .all(|f| f.state == FileState::Sealed));
    assert_eq!(manager.active().number, 4);
    assert_eq!(manager.active().base_lsn, 5);
    assert_eq!(manager.recovered_next_lsn(), 6);
}

#[test]
fn test_reopen_rejects_gap_in_numbering() {
    let (_temp, dir) = setup_temp_dir();
    {
        let mut manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
        manager.rotate(1).unwrap();
        manager.rotate(1).unwrap();
    }
    fs::remove_file(file_path(&dir, 1)).unwrap();

    let result = LogFileManager::open(&dir, SUFFIX, 8192);

    assert!(matches!(result, Err(LogError::Config(_))));
}

#[test]
fn test_reopen_rejects_bad_magic() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    fs::write(file_path(&dir, 0), [0xAAu8; 64]).unwrap();

    let err = LogFileManager::open(&dir, SUFFIX, 8192).err().unwrap();

    assert!(matches!(err, LogError::InvalidFile { .. }));
    assert!(err.is_invalid_log());
}

#[test]
fn test_reopen_rejects_short_header() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    fs::write(file_path(&dir, 0), b"DWAL").unwrap();

    let result = LogFileManager::open(&dir, SUFFIX, 8192);

    assert!(matches!(result, Err(LogError::InvalidFile { .. })));
}

#[test]
fn test_reopen_rejects_damaged_header() {
    let (_temp, dir) = setup_temp_dir();
    LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
    // base LSN field, covered by the header checksum
    flip_byte(&file_path(&dir, 0), 17);

    let result = LogFileManager::open(&dir, SUFFIX, 8192);

    assert!(matches!(result, Err(LogError::InvalidFile { .. })));
}

#[test]
fn test_reopen_rejects_misnamed_file() {
    let (_temp, dir) = setup_temp_dir();
    LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
    fs::rename(file_path(&dir, 0), file_path(&dir, 3)).unwrap();

    let result = LogFileManager::open(&dir, SUFFIX, 8192);

    assert!(matches!(result, Err(LogError::InvalidFile { .. })));
}

#[test]
fn test_reopen_rejects_file_larger_than_cap() {
    let (_temp, dir) = setup_temp_dir();
    write_frames(&dir, 10);

    let result = LogFileManager::open(&dir, SUFFIX, FILE_HEADER_SIZE + 100);

    assert!(matches!(result, Err(LogError::Config(_))));
}

// =============================================================================
// Torn Tail Recovery Tests
// =============================================================================

#[test]
fn test_reopen_truncates_partial_frame() {
    let (_temp, dir) = setup_temp_dir();
    write_frames(&dir, 2);

    // Half of a third frame: full header plus 4 of 10 payload bytes
    let partial = &encode_frame(3, &[3u8; 10])[..20];
    let mut file = OpenOptions::new().append(true).open(file_path(&dir, 0)).unwrap();
    file.write_all(partial).unwrap();
    drop(file);

    let manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    let expected_len = FILE_HEADER_SIZE + 2 * SMALL_FRAME;
    assert_eq!(manager.active().len, expected_len);
    assert_eq!(manager.recovered_next_lsn(), 3);
    assert_eq!(fs::metadata(file_path(&dir, 0)).unwrap().len(), expected_len);
}

#[test]
fn test_reopen_truncates_partial_header() {
    let (_temp, dir) = setup_temp_dir();
    write_frames(&dir, 2);

    let mut file = OpenOptions::new().append(true).open(file_path(&dir, 0)).unwrap();
    file.write_all(&[0u8; 7]).unwrap();
    drop(file);

    let manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    assert_eq!(manager.active().len, FILE_HEADER_SIZE + 2 * SMALL_FRAME);
    assert_eq!(manager.recovered_next_lsn(), 3);
}

#[test]
fn test_reopen_drops_torn_last_frame() {
    let (_temp, dir) = setup_temp_dir();
    write_frames(&dir, 3);
    // Payload of the last frame; it ends exactly at end of file
    flip_byte(&file_path(&dir, 0), FILE_HEADER_SIZE + 2 * SMALL_FRAME + 16 + 2);

    let manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();

    assert_eq!(manager.active().len, FILE_HEADER_SIZE + 2 * SMALL_FRAME);
    assert_eq!(manager.recovered_next_lsn(), 3);
}

#[test]
fn test_reopen_fails_on_corruption_before_tail() {
    let (_temp, dir) = setup_temp_dir();
    write_frames(&dir, 3);
    let frame_offset = FILE_HEADER_SIZE + SMALL_FRAME;
    flip_byte(&file_path(&dir, 0), frame_offset + 16 + 2);

    let err = LogFileManager::open(&dir, SUFFIX, 8192).err().unwrap();

    match err {
        LogError::Corrupted { offset, ref path, .. } => {
            assert_eq!(offset, frame_offset);
            assert_eq!(path, &file_path(&dir, 0));
        }
        other => panic!("Expected Corrupted, got {:?}", other),
    }
}

#[test]
fn test_reopen_fails_on_lsn_out_of_sequence() {
    let (_temp, dir) = setup_temp_dir();
    {
        let mut manager = LogFileManager::open(&dir, SUFFIX, 8192).unwrap();
        manager.write_frame(&encode_frame(1, b"first")).unwrap();
        manager.write_frame(&encode_frame(5, b"skipped ahead")).unwrap();
    }

    let result = LogFileManager::open(&dir, SUFFIX, 8192);

    assert!(matches!(result, Err(LogError::Corrupted { .. })));
}
