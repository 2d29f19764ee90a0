//! Sequential journal reader with corruption detection
//!
//! Reads framed commit bundles back from the journal directory, validating
//! the CRC32C checksum of every frame. A truncated tail (torn write at
//! crash) ends the stream with the valid prefix intact; checksum mismatches
//! are surfaced with their byte offset.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::bundle::CommitBundle;
use crate::journal::JournalFrame;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("checksum mismatch at byte offset {offset}: entry seq={sequence}")]
    ChecksumMismatch { offset: u64, sequence: u64 },

    #[error("undecodable bundle at seq={sequence}: {detail}")]
    BadPayload { sequence: u64, detail: String },
}

/// Where and why a read stopped short.
#[derive(Debug, Clone)]
pub struct CorruptionRecord {
    pub byte_offset: u64,
    pub detail: String,
}

/// Sequential reader over all journal files in a directory.
pub struct JournalReader {
    files: Vec<PathBuf>,
    current_file_idx: usize,
    data: Vec<u8>,
    pos: usize,
    global_offset: u64,
    last_sequence: Option<u64>,
    corruption_log: Vec<CorruptionRecord>,
}

impl JournalReader {
    /// Open a reader over all journal files in `dir`, sorted by index.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let files = Self::discover_files(dir)?;
        let mut reader = Self {
            files,
            current_file_idx: 0,
            data: Vec::new(),
            pos: 0,
            global_offset: 0,
            last_sequence: None,
            corruption_log: Vec::new(),
        };
        reader.load_current_file()?;
        Ok(reader)
    }

    /// Read the next checksum-valid bundle.
    ///
    /// Returns `None` when all files are exhausted. A truncated tail is
    /// logged and treated as end-of-stream.
    pub fn next_bundle(&mut self) -> Result<Option<CommitBundle>, ReaderError> {
        loop {
            if self.pos >= self.data.len() {
                if !self.advance_file()? {
                    return Ok(None);
                }
            }

            let offset_before = self.global_offset;
            match JournalFrame::from_bytes(&self.data[self.pos..]) {
                Ok((frame, consumed)) => {
                    self.pos += consumed;
                    self.global_offset += consumed as u64;

                    if !frame.verify_checksum() {
                        self.corruption_log.push(CorruptionRecord {
                            byte_offset: offset_before,
                            detail: format!(
                                "CRC32C mismatch for seq={}, stored={:#010x}",
                                frame.sequence, frame.checksum
                            ),
                        });
                        return Err(ReaderError::ChecksumMismatch {
                            offset: offset_before,
                            sequence: frame.sequence,
                        });
                    }

                    let bundle: CommitBundle = bincode::deserialize(&frame.payload)
                        .map_err(|err| ReaderError::BadPayload {
                            sequence: frame.sequence,
                            detail: err.to_string(),
                        })?;

                    self.last_sequence = Some(frame.sequence);
                    return Ok(Some(bundle));
                }
                Err(_) => {
                    // Torn write at end of file; keep the valid prefix
                    let remaining = self.data.len() - self.pos;
                    if remaining > 0 {
                        self.corruption_log.push(CorruptionRecord {
                            byte_offset: offset_before,
                            detail: format!(
                                "truncated entry: {remaining} bytes remaining, cannot parse"
                            ),
                        });
                    }
                    self.pos = self.data.len();
                }
            }
        }
    }

    /// Read every valid bundle up to the first corruption, logging what was
    /// dropped.
    pub fn read_all_tolerant(&mut self) -> Result<Vec<CommitBundle>, ReaderError> {
        let mut bundles = Vec::new();
        loop {
            match self.next_bundle() {
                Ok(Some(bundle)) => bundles.push(bundle),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "journal read stopped at corruption; keeping valid prefix");
                    break;
                }
            }
        }
        Ok(bundles)
    }

    /// Last successfully read sequence number.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Corruption encountered so far.
    pub fn corruption_log(&self) -> &[CorruptionRecord] {
        &self.corruption_log
    }

    fn discover_files(dir: &Path) -> Result<Vec<PathBuf>, ReaderError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| {
                        let name = name.to_string_lossy();
                        name.starts_with("commit-") && name.ends_with(".bin")
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn load_current_file(&mut self) -> Result<(), ReaderError> {
        self.data = match self.files.get(self.current_file_idx) {
            Some(path) => fs::read(path)?,
            None => Vec::new(),
        };
        self.pos = 0;
        Ok(())
    }

    fn advance_file(&mut self) -> Result<bool, ReaderError> {
        if self.current_file_idx + 1 >= self.files.len() {
            return Ok(false);
        }
        self.current_file_idx += 1;
        self.load_current_file()?;
        Ok(!self.data.is_empty() || self.current_file_idx + 1 < self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CommitBundle;
    use crate::journal::{JournalConfig, JournalStore};
    use crate::store::DurableStore;
    use tempfile::TempDir;

    fn write_bundles(dir: &Path, count: u64) {
        let mut store = JournalStore::open(JournalConfig::new(dir)).unwrap();
        for sequence in 1..=count {
            store
                .commit(&CommitBundle::new(sequence, sequence as i64 * 1_000))
                .unwrap();
        }
        store.sync().unwrap();
    }

    #[test]
    fn test_read_back_all_bundles() {
        let tmp = TempDir::new().unwrap();
        write_bundles(tmp.path(), 10);

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        let bundles = reader.read_all_tolerant().unwrap();

        assert_eq!(bundles.len(), 10);
        assert_eq!(bundles[0].sequence, 1);
        assert_eq!(bundles[9].sequence, 10);
        assert_eq!(reader.last_sequence(), Some(10));
        assert!(reader.corruption_log().is_empty());
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert!(reader.next_bundle().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("never-created");
        let mut reader = JournalReader::open(&missing).unwrap();
        assert!(reader.next_bundle().unwrap().is_none());
    }

    #[test]
    fn test_truncated_tail_keeps_valid_prefix() {
        let tmp = TempDir::new().unwrap();
        write_bundles(tmp.path(), 5);

        // Chop the tail of the single journal file
        let file = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_name().to_string_lossy().ends_with(".bin"))
            .unwrap();
        let data = fs::read(file.path()).unwrap();
        fs::write(file.path(), &data[..data.len() - 7]).unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        let bundles = reader.read_all_tolerant().unwrap();

        assert_eq!(bundles.len(), 4);
        assert!(!reader.corruption_log().is_empty());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let tmp = TempDir::new().unwrap();
        write_bundles(tmp.path(), 1);

        let file = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_name().to_string_lossy().ends_with(".bin"))
            .unwrap();
        let mut data = fs::read(file.path()).unwrap();
        // Flip a payload byte, leaving the frame structurally intact
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(file.path(), &data).unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        let result = reader.next_bundle();
        assert!(matches!(
            result,
            Err(ReaderError::ChecksumMismatch { .. }) | Err(ReaderError::BadPayload { .. })
        ));
    }

    #[test]
    fn test_reads_across_rotated_files() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            max_file_size: 80,
            ..JournalConfig::new(tmp.path())
        };
        let mut store = JournalStore::open(config).unwrap();
        for sequence in 1..=12 {
            store
                .commit(&CommitBundle::new(sequence, sequence as i64))
                .unwrap();
        }
        store.sync().unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        let bundles = reader.read_all_tolerant().unwrap();
        assert_eq!(bundles.len(), 12);
    }
}
