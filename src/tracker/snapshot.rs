//! Watch Registry Snapshot
//!
//! Durable copy of the registry across restarts.
//!
//! File layout: `gzip(bincode(SnapshotFile))`, where the entries are
//! bincode-encoded separately so a CRC64 can be checked before decoding.
//! A missing file is created empty and an empty file is an empty registry.
//! Any other decode problem is fatal to the caller.

use super::error::TrackerError;
use super::model::WatchedTransaction;
use super::registry::WatchRegistry;
use chrono::{DateTime, Duration, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Records older than this are dropped by the expiry sweep.
pub const RETENTION_DAYS: i64 = 14;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub record: WatchedTransaction,
    /// Last-touched timestamp, `YYYYMMDDHHMMSS` UTC.
    pub touched: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    entries_checksum: String,
    entries: Vec<u8>,
}

impl SnapshotFile {
    const FORMAT_VERSION: u32 = 1;
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the registry from disk.
    pub fn load(&self) -> Result<WatchRegistry, TrackerError> {
        let registry = WatchRegistry::new();

        if !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            File::create(&self.path)?;
            tracing::info!(path = %self.path.display(), "No snapshot found, created empty file");
            return Ok(registry);
        }

        let mut compressed = Vec::new();
        File::open(&self.path)?.read_to_end(&mut compressed)?;
        if compressed.is_empty() {
            tracing::info!(path = %self.path.display(), "Snapshot file is empty");
            return Ok(registry);
        }

        let mut raw = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| TrackerError::Snapshot(format!("decompress failed: {}", e)))?;

        let file: SnapshotFile = bincode::deserialize(&raw)
            .map_err(|e| TrackerError::Snapshot(format!("container decode failed: {}", e)))?;

        if file.format_version != SnapshotFile::FORMAT_VERSION {
            return Err(TrackerError::Snapshot(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }

        let checksum = calculate_crc64(&file.entries);
        if checksum != file.entries_checksum {
            return Err(TrackerError::Snapshot(format!(
                "checksum mismatch: expected {}, got {}",
                file.entries_checksum, checksum
            )));
        }

        let entries: Vec<SnapshotEntry> = bincode::deserialize(&file.entries)
            .map_err(|e| TrackerError::Snapshot(format!("entries decode failed: {}", e)))?;

        let count = entries.len();
        for entry in entries {
            registry.add(entry.record, entry.touched);
        }

        tracing::info!(path = %self.path.display(), count, "Snapshot loaded");
        Ok(registry)
    }

    /// Write the full registry, replacing the previous snapshot.
    ///
    /// Writes `<path>.tmp` first and renames it over the target.
    pub fn save(&self, registry: &WatchRegistry) -> Result<(), TrackerError> {
        let entries: Vec<SnapshotEntry> = registry
            .entries()
            .into_iter()
            .map(|(record, touched)| SnapshotEntry { record, touched })
            .collect();
        let count = entries.len();

        let entries_bytes = bincode::serialize(&entries)
            .map_err(|e| TrackerError::Snapshot(format!("entries encode failed: {}", e)))?;
        let file = SnapshotFile {
            format_version: SnapshotFile::FORMAT_VERSION,
            entries_checksum: calculate_crc64(&entries_bytes),
            entries: entries_bytes,
        };
        let raw = bincode::serialize(&file)
            .map_err(|e| TrackerError::Snapshot(format!("container encode failed: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        {
            let out = BufWriter::new(File::create(&tmp_path)?);
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(&raw)?;
            let mut out = encoder.finish()?;
            out.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!(path = %self.path.display(), count, "Snapshot saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

pub fn default_retention() -> Duration {
    Duration::days(RETENTION_DAYS)
}

/// Remove every record whose `watched_since + retention` lies before `now`.
pub fn sweep_expired(registry: &WatchRegistry, now: DateTime<Utc>, retention: Duration) -> usize {
    let removed = registry.remove_older_than(now - retention);
    for record in &removed {
        tracing::info!(
            tx_id = %record.tx_id,
            network = %record.network,
            watched_since = %record.watched_since,
            "Watch expired"
        );
    }
    removed.len()
}

fn calculate_crc64(data: &[u8]) -> String {
    use crc::{CRC_64_ECMA_182, Crc};

    const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);
    format!("{:016x}", CRC64.checksum(data))
}
