//! Disk overflow store
//!
//! Oversized entries are written as one JSON file per spill, named
//! `<hex key>.<write id>.json` so two spills of the same key never share a
//! file. When the entry was compressed the result is stored as
//! base64 gzip bytes, otherwise as the plain result object.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::codec::PayloadCodec;
use crate::domain::query_cache::{CacheEntry, CompositeKey, StoredPayload};
use crate::domain::DomainError;

const ENTRY_FILE_EXTENSION: &str = "json";
const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o644;

/// On-disk layout of a spilled entry
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskRecord {
    key: String,
    query: String,
    network: String,
    snapshot: String,
    created_at: DateTime<Utc>,
    is_compressed: bool,
    uncompressed_size: u64,
    compressed_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compressed_result: Option<String>,
}

/// A serialized entry waiting to be written
///
/// Produced by [`DiskOverflowStore::prepare`] so the blocking write can run
/// away from the entry itself.
#[derive(Debug)]
pub struct PendingSpill {
    path: PathBuf,
    contents: Vec<u8>,
    is_compressed: bool,
}

impl PendingSpill {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the entry at the written file
    pub fn apply(self, entry: &mut CacheEntry) {
        let compressed_size = if self.is_compressed {
            entry.compressed_size()
        } else {
            0
        };
        entry.set_on_disk(self.path, self.is_compressed, compressed_size);
    }
}

/// Persists oversized entries to local files and reloads them
#[derive(Debug, Clone)]
pub struct DiskOverflowStore {
    dir: PathBuf,
    codec: PayloadCodec,
}

impl DiskOverflowStore {
    pub fn new(dir: impl Into<PathBuf>, codec: PayloadCodec) -> Self {
        Self {
            dir: dir.into(),
            codec,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for one spill of the entry with this key
    pub fn entry_path(&self, key: &CompositeKey, write_id: &Uuid) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}",
            key.as_str(),
            write_id.simple(),
            ENTRY_FILE_EXTENSION
        ))
    }

    /// Composite key encoded in an entry or temp file name
    fn key_of(path: &Path) -> Option<CompositeKey> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.split('.').next())
            .and_then(CompositeKey::from_hex)
    }

    fn ensure_dir(&self) -> Result<(), DomainError> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }

        builder.create(&self.dir).map_err(|e| {
            DomainError::disk_write(format!(
                "Failed to create overflow directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    fn write_file(path: &Path, contents: &[u8]) -> Result<(), DomainError> {
        let tmp_path = path.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }

        let write = || -> std::io::Result<()> {
            let mut file = options.open(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DomainError::disk_write(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Serialize an entry for spilling under a fresh file name
    ///
    /// Returns `None` when the entry already lives on disk.
    pub fn prepare(&self, entry: &CacheEntry) -> Result<Option<PendingSpill>, DomainError> {
        let (result, compressed_result) = match entry.payload() {
            StoredPayload::InMemory(value) => (Some(value.clone()), None),
            StoredPayload::Compressed(bytes) => (None, Some(BASE64.encode(bytes))),
            StoredPayload::OnDisk { .. } => return Ok(None),
        };

        let is_compressed = compressed_result.is_some();
        let record = DiskRecord {
            key: entry.key().to_string(),
            query: entry.query().to_string(),
            network: entry.scope().network.clone(),
            snapshot: entry.scope().snapshot.clone(),
            created_at: entry.created_at(),
            is_compressed,
            uncompressed_size: entry.uncompressed_size(),
            compressed_size: entry.compressed_size(),
            result,
            compressed_result,
        };

        let contents = serde_json::to_vec(&record).map_err(|e| {
            DomainError::disk_write(format!("Failed to serialize entry {}: {}", entry.key(), e))
        })?;

        Ok(Some(PendingSpill {
            path: self.entry_path(entry.key(), &Uuid::new_v4()),
            contents,
            is_compressed,
        }))
    }

    /// Write a prepared spill; this blocks on file IO
    pub fn write(&self, spill: &PendingSpill) -> Result<(), DomainError> {
        self.ensure_dir()?;
        Self::write_file(&spill.path, &spill.contents)?;

        debug!(
            path = %spill.path.display(),
            bytes = spill.contents.len(),
            compressed = spill.is_compressed,
            "Spilled cache entry to disk"
        );

        Ok(())
    }

    /// Write the entry's payload to disk and point the entry at the file
    ///
    /// The entry keeps its current representation if the write fails.
    pub fn save(&self, entry: &mut CacheEntry) -> Result<(), DomainError> {
        if let Some(spill) = self.prepare(entry)? {
            self.write(&spill)?;
            spill.apply(entry);
        }

        Ok(())
    }

    /// Read a spilled entry's payload back
    pub fn load(&self, path: &Path) -> Result<Value, DomainError> {
        let contents = fs::read(path).map_err(|e| {
            DomainError::disk_read(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let record: DiskRecord = serde_json::from_slice(&contents).map_err(|e| {
            DomainError::disk_read(format!("Corrupt entry file {}: {}", path.display(), e))
        })?;

        if record.is_compressed {
            let encoded = record.compressed_result.ok_or_else(|| {
                DomainError::disk_read(format!("{} is missing its result", path.display()))
            })?;
            let bytes = BASE64.decode(encoded).map_err(|e| {
                DomainError::disk_read(format!("Invalid base64 in {}: {}", path.display(), e))
            })?;

            self.codec.decompress(&bytes)
        } else {
            record.result.ok_or_else(|| {
                DomainError::disk_read(format!("{} is missing its result", path.display()))
            })
        }
    }

    /// Delete a spilled file, logging instead of failing
    pub fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove overflow file {}: {}", path.display(), e);
            }
        }
    }

    /// Delete entry files whose key is not in `keep`
    ///
    /// Returns the number of files removed. A missing directory counts as
    /// nothing to reclaim.
    pub fn reclaim_orphans(&self, keep: &HashSet<CompositeKey>) -> Result<usize, DomainError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(DomainError::disk_read(format!(
                    "Failed to list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut removed = 0;

        for item in dir.flatten() {
            let path = item.path();
            let ext = path.extension().and_then(|e| e.to_str());

            if ext != Some(ENTRY_FILE_EXTENSION) && ext != Some("tmp") {
                continue;
            }

            match Self::key_of(&path) {
                Some(key) if keep.contains(&key) => continue,
                Some(_) => {}
                None => continue,
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to reclaim {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}
