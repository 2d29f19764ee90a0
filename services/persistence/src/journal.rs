//! Append-only commit journal with checksums
//!
//! The reference `DurableStore`: each commit bundle is bincode-encoded and
//! appended as one framed entry. Files rotate by size; fsync cadence is
//! configurable.
//!
//! # Binary format (per entry)
//! ```text
//! [body_len:  u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [payload_len: u32][payload: bincode(CommitBundle)]
//! [checksum: u32]  // CRC32C over sequence + timestamp + payload
//! ```

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::bundle::CommitBundle;
use crate::store::{DurableStore, StoreError};

// Frame overhead without payload: 8 (seq) + 8 (ts) + 4 (payload_len) + 4 (crc)
const FRAME_MIN_BODY: usize = 24;

/// One framed journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalFrame {
    pub sequence: u64,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalFrame {
    /// Frame a payload, computing its checksum.
    pub fn new(sequence: u64, timestamp: i64, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, &payload);
        Self {
            sequence,
            timestamp,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, self.timestamp, &self.payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload_len = self.payload.len() as u32;
        let body_len = (FRAME_MIN_BODY as u32) + payload_len;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse one frame from the head of `data`.
    ///
    /// Returns `(frame, bytes_consumed)`. Corrupted or truncated input
    /// yields an error instead of panicking.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), StoreError> {
        if data.len() < 4 {
            return Err(StoreError::Serialization(
                "not enough data for length prefix".into(),
            ));
        }

        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if body_len > 100_000_000 {
            return Err(StoreError::Serialization(format!(
                "implausible body length: {body_len} (likely corruption)"
            )));
        }
        if body_len < FRAME_MIN_BODY {
            return Err(StoreError::Serialization(format!(
                "body too small: {body_len} bytes, minimum is {FRAME_MIN_BODY}"
            )));
        }

        let total = 4 + body_len;
        if data.len() < total {
            return Err(StoreError::Serialization(format!(
                "incomplete entry: need {} bytes, have {}",
                total,
                data.len()
            )));
        }

        let body = &data[4..total];
        let sequence = u64::from_le_bytes(body[0..8].try_into().unwrap());
        let timestamp = i64::from_le_bytes(body[8..16].try_into().unwrap());
        let payload_len = u32::from_le_bytes(body[16..20].try_into().unwrap()) as usize;

        if 20 + payload_len + 4 != body.len() {
            return Err(StoreError::Serialization(format!(
                "payload length {} inconsistent with body length {}",
                payload_len,
                body.len()
            )));
        }

        let payload = body[20..20 + payload_len].to_vec();
        let checksum = u32::from_le_bytes(
            body[20 + payload_len..]
                .try_into()
                .unwrap(),
        );

        Ok((
            Self {
                sequence,
                timestamp,
                payload,
                checksum,
            },
            total,
        ))
    }
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync after every commit.
    EveryWrite,
    /// Fsync every N commits.
    EveryN(usize),
    /// Fsync only on file rotation.
    OnRotation,
}

/// Journal store configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal files.
    pub dir: PathBuf,
    /// Maximum file size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

/// Append-only journal-backed durable store.
pub struct JournalStore {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    file_index: u64,
    last_sequence: Option<u64>,
    writes_since_fsync: usize,
}

impl JournalStore {
    /// Open the journal, continuing the latest file in the directory.
    pub fn open(config: JournalConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = Self::find_latest_index(&config.dir);
        let current_file = Self::journal_path(&config.dir, file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            file_index,
            last_sequence: None,
            writes_since_fsync: 0,
        })
    }

    /// Seed the idempotency watermark after recovery.
    pub fn set_last_sequence(&mut self, sequence: Option<u64>) {
        self.last_sequence = sequence;
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Force flush + fsync (used before shutdown / rotation).
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_fsync = 0;
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), StoreError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), StoreError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = Self::journal_path(&self.config.dir, self.file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }

    pub(crate) fn journal_path(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("commit-{:06}.bin", index))
    }

    pub(crate) fn find_latest_index(dir: &Path) -> u64 {
        fs::read_dir(dir)
            .ok()
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let name = entry.file_name().to_string_lossy().to_string();
                        name.strip_prefix("commit-")
                            .and_then(|rest| rest.strip_suffix(".bin"))
                            .and_then(|index| index.parse::<u64>().ok())
                    })
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

impl DurableStore for JournalStore {
    fn commit(&mut self, bundle: &CommitBundle) -> Result<(), StoreError> {
        if let Some(last) = self.last_sequence {
            if bundle.sequence <= last {
                // Retry of an already-committed bundle
                return Ok(());
            }
        }

        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let payload = bincode::serialize(bundle)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let frame = JournalFrame::new(bundle.sequence, bundle.timestamp, payload);
        let bytes = frame.to_bytes();

        self.writer.write_all(&bytes)?;
        self.writer.flush()?;

        self.current_file_size += bytes.len() as u64;
        self.writes_since_fsync += 1;
        self.apply_fsync_policy()?;

        self.last_sequence = Some(bundle.sequence);
        debug!(details = %bundle.details(), "bundle journalled");
        Ok(())
    }

    fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}
