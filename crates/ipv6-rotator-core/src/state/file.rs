// # File Record Store
//
// File-based implementation of RecordStore with crash recovery.
//
// ## Purpose
//
// Keeps rotation records across runs so `clean` can undo a rotation made
// by an earlier process, or one that died half-way.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## Concurrency
//
// Every operation re-reads the file, so separate invocations see each
// other's writes. There is no cross-process lock: two processes writing at
// the same time resolve as "last write wins".
//
// ## File Format
//
// ```json
// [
//   {
//     "ranges": ["2001:4860:4000::/36"],
//     "random_ipv6_address": "2001:db8::1234",
//     "random_ipv6_address_mask": 64,
//     "gateway": "fe80::1",
//     "interface_index": 2,
//     "interface_name": "eth0",
//     "ipv6_subnet": "2001:db8::/64",
//     "created_at": "2025-01-09T12:00:00Z"
//   }
// ]
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::ranges::ServiceRangeSet;
use crate::traits::record_store::{RecordStore, RotationRecord};

/// File-based record store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ipv6_rotator_core::state::FileRecordStore;
/// use ipv6_rotator_core::traits::RecordStore;
/// use ipv6_rotator_core::ServiceRangeSet;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::new("/tmp/smart-ipv6-rotator.json").await?;
///
///     let ranges = ServiceRangeSet::from_cidrs(["2001:4860:4000::/36"])?;
///     if let Some(record) = store.find(&ranges).await? {
///         println!("{} is rotated to {}", ranges, record.assigned_address);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Open a file record store
    ///
    /// Creates the parent directory if needed. The file itself is only
    /// created on the first write.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error("create directory", parent, e))?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Load records with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main record file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_records_with_recovery(path: &Path) -> Result<Vec<RotationRecord>, Error> {
        match Self::load_records(path).await {
            Ok(records) => {
                tracing::debug!("Loaded {} rotation record(s) from {}", records.len(), path.display());
                Ok(records)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Record file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(Vec::new());
                }

                match Self::load_records(&backup_path).await {
                    Ok(records) => {
                        tracing::info!("Recovered {} record(s) from backup", records.len());

                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore record file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load records from file
    ///
    /// Parse failures are returned as [`Error::Json`] so the caller can tell
    /// corruption apart from I/O failures.
    async fn load_records(path: &Path) -> Result<Vec<RotationRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Record file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| io_error("read", path, e))?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Write records to file atomically
    ///
    /// temp file, fsync, copy current file to `.backup`, rename over
    async fn write_records(&self, records: &[RotationRecord]) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| Error::store(format!("Failed to serialize records: {}", e)))?;

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_error("create", &temp_path, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| io_error("write", &temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("sync", &temp_path, e))?;
        drop(file);

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to back up {}: {}", self.path.display(), e);
            }
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| io_error("replace", &self.path, e))?;

        tracing::trace!("Wrote {} record(s) to {}", records.len(), self.path.display());
        Ok(())
    }

    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path)
            .await
            .map_err(|e| io_error("restore", path, e))?;

        tracing::info!("Restored {} from {}", path.display(), backup_path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        with_suffix(path, ".backup")
    }
}

/// Append `suffix` to the full file name, so `state.tmp` becomes `state.tmp.tmp`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::store(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn find(&self, ranges: &ServiceRangeSet) -> Result<Option<RotationRecord>, Error> {
        let records = Self::load_records_with_recovery(&self.path).await?;
        Ok(records.into_iter().find(|record| &record.ranges == ranges))
    }

    async fn save(&self, record: &RotationRecord) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut records = Self::load_records_with_recovery(&self.path).await?;
        records.retain(|existing| existing.ranges != record.ranges);
        records.push(record.clone());

        self.write_records(&records).await
    }

    async fn remove(&self, ranges: &ServiceRangeSet) -> Result<bool, Error> {
        let _guard = self.write_lock.lock().await;

        let mut records = Self::load_records_with_recovery(&self.path).await?;
        let before = records.len();
        records.retain(|existing| &existing.ranges != ranges);

        if records.len() == before {
            return Ok(false);
        }

        self.write_records(&records).await?;
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<RotationRecord>, Error> {
        Self::load_records_with_recovery(&self.path).await
    }
}
