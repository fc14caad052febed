// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Scheduled, retention-bounded database snapshots with compression."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! The backup supervisor copies the live database file on a schedule,
//! compresses it above a size threshold, sweeps snapshots past their
//! retention window, and can restore a prior snapshot back over the live
//! file (always taking a pre-restore snapshot of its own first).
//!
//! Snapshot failure is logged and surfaced as this crate's own error return;
//! the supervisor's scheduled loop swallows it and continues on the next
//! tick rather than aborting the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iv_compress::{CompressionAlgorithm, MessageCompressor};
use iv_config::BackupConfig;
use iv_error::{ErrorCode, IvError, IvResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_PREFIX: &str = "backup";

/// Pluggable hook for shipping a finished snapshot somewhere other than the
/// local `backup_path`. Injectable so the supervisor's scheduling and
/// retention logic can be tested without a real offsite target.
#[async_trait]
pub trait OffsiteUploader: Send + Sync {
    /// Upload the snapshot at `path`. Failures are logged and do not fail
    /// the snapshot itself — the local copy is the source of truth.
    async fn upload(&self, path: &Path) -> IvResult<()>;
}

/// One snapshot file on disk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotInfo {
    /// Snapshot filename (no directory component).
    pub name: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last-modified time.
    pub modified_at: DateTime<Utc>,
    /// Whether this snapshot is gzip-compressed.
    pub compressed: bool,
}

/// Aggregate statistics across all retained snapshots.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BackupStats {
    /// Number of snapshot files.
    pub count: usize,
    /// Total bytes across all snapshot files.
    pub total_bytes: u64,
    /// Oldest snapshot's timestamp, if any exist.
    pub oldest: Option<DateTime<Utc>>,
    /// Newest snapshot's timestamp, if any exist.
    pub newest: Option<DateTime<Utc>>,
    /// Count of `.db.gz` (compressed) snapshots.
    pub compressed_count: usize,
    /// Count of `.db` (uncompressed) snapshots.
    pub uncompressed_count: usize,
}

/// Result of a successful [`BackupSupervisor::restore`] call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RestoreOutcome {
    /// Name of the snapshot that was restored from.
    pub restored_from: String,
    /// Name of the pre-restore safety snapshot taken before overwriting the
    /// live database.
    pub pre_restore_snapshot_name: String,
}

/// Scheduled, retention-bounded database snapshot supervisor.
pub struct BackupSupervisor {
    db_path: PathBuf,
    config: BackupConfig,
    prefix: String,
    uploader: Option<Arc<dyn OffsiteUploader>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackupSupervisor {
    /// Build a supervisor for the live database at `db_path`.
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, config: BackupConfig) -> Self {
        Self {
            db_path: db_path.into(),
            config,
            prefix: DEFAULT_PREFIX.to_string(),
            uploader: None,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Attach an offsite upload hook, invoked after every successful
    /// snapshot when `config.enabled`.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn OffsiteUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Start the supervisor: take one snapshot immediately, then schedule
    /// periodic snapshots every `interval_hours` and a daily retention
    /// sweep. A no-op if `config.enabled` is `false`.
    pub async fn start(self: &Arc<Self>) -> IvResult<()> {
        if !self.config.enabled {
            info!("backup supervisor disabled, not starting");
            return Ok(());
        }

        if let Err(e) = self.create_snapshot().await {
            warn!(error = %e, "initial backup snapshot failed");
        }

        let mut handles = self.handles.lock().await;

        let snapshot_self = Arc::clone(self);
        let interval = Duration::from_secs(self.config.interval_hours.max(1) * 3600);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                ticker.tick().await;
                if let Err(e) = snapshot_self.create_snapshot().await {
                    warn!(error = %e, "scheduled backup snapshot failed");
                }
            }
        }));

        let sweep_self = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 3600));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = sweep_self.cleanup().await {
                    warn!(error = %e, "scheduled retention sweep failed");
                }
            }
        }));

        Ok(())
    }

    /// Cancel both the snapshot and retention-sweep timers.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Copy the live database file into `backup_path`, compressing it if it
    /// exceeds `compression_threshold_bytes`. Invokes the offsite uploader,
    /// if configured, after a successful local copy.
    pub async fn create_snapshot(&self) -> IvResult<SnapshotInfo> {
        if !self.db_path.exists() {
            return Err(IvError::new(
                ErrorCode::ProcessingError,
                "live database file does not exist",
            )
            .with_context("db_path", self.db_path.display().to_string()));
        }

        std::fs::create_dir_all(&self.config.path).map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, "failed to create backup directory").with_source(e)
        })?;

        let timestamp = timestamp_component(Utc::now());
        let raw_name = format!("{}-{timestamp}.db", self.prefix);
        let raw_path = PathBuf::from(&self.config.path).join(&raw_name);

        let bytes_copied = std::fs::copy(&self.db_path, &raw_path).map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, "failed to copy live database").with_source(e)
        })?;

        let (final_path, compressed) = if bytes_copied > self.config.compression_threshold_bytes {
            match self.try_compress(&raw_path) {
                Ok(gz_path) => (gz_path, true),
                Err(e) => {
                    warn!(error = %e, "snapshot compression failed, keeping uncompressed copy");
                    (raw_path, false)
                }
            }
        } else {
            (raw_path, false)
        };

        let metadata = std::fs::metadata(&final_path).map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, "failed to stat snapshot file").with_source(e)
        })?;

        let info = SnapshotInfo {
            name: final_path.file_name().unwrap().to_string_lossy().to_string(),
            path: final_path.clone(),
            size_bytes: metadata.len(),
            modified_at: Utc::now(),
            compressed,
        };

        info!(name = %info.name, size_bytes = info.size_bytes, compressed, "backup snapshot created");

        if let Some(uploader) = &self.uploader {
            if let Err(e) = uploader.upload(&final_path).await {
                warn!(error = %e, "offsite upload failed, local snapshot is still retained");
            }
        }

        Ok(info)
    }

    fn try_compress(&self, raw_path: &Path) -> IvResult<PathBuf> {
        let gz_path = raw_path.with_extension("db.gz");
        let compressor = MessageCompressor::new(CompressionAlgorithm::Gzip);
        compressor
            .compress_file(raw_path, &gz_path)
            .map_err(|e| IvError::new(ErrorCode::ProcessingError, "gzip compression failed").with_source(e))?;
        std::fs::remove_file(raw_path).map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, "failed to remove uncompressed snapshot after compression")
                .with_source(e)
        })?;
        Ok(gz_path)
    }

    /// List all retained snapshots, newest first.
    pub fn list(&self) -> IvResult<Vec<SnapshotInfo>> {
        let mut snapshots = self.collect_snapshots()?;
        snapshots.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(snapshots)
    }

    fn collect_snapshots(&self) -> IvResult<Vec<SnapshotInfo>> {
        let dir = Path::new(&self.config.path);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(dir).map_err(|e| {
            IvError::new(ErrorCode::ProcessingError, "failed to read backup directory").with_source(e)
        })?;

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&format!("{}-", self.prefix)) {
                continue;
            }
            let compressed = name.ends_with(".db.gz");
            if !(compressed || name.ends_with(".db")) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let modified_at = metadata
                .modified()
                .ok()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            snapshots.push(SnapshotInfo {
                name: name.to_string(),
                path,
                size_bytes: metadata.len(),
                modified_at,
                compressed,
            });
        }
        Ok(snapshots)
    }

    /// Delete every retained snapshot whose last-modified age exceeds
    /// `retention_days`. Returns the number of files deleted.
    pub async fn cleanup(&self) -> IvResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days as i64);
        let snapshots = self.collect_snapshots()?;
        let mut deleted = 0;
        for snapshot in snapshots {
            if snapshot.modified_at < cutoff {
                if let Err(e) = std::fs::remove_file(&snapshot.path) {
                    warn!(name = %snapshot.name, error = %e, "failed to delete expired snapshot");
                    continue;
                }
                deleted += 1;
            }
        }
        info!(deleted, "retention sweep complete");
        Ok(deleted)
    }

    /// Restore `name` over the live database, after first taking a
    /// pre-restore safety snapshot of the current live contents.
    pub async fn restore(&self, name: &str) -> IvResult<RestoreOutcome> {
        let source_path = PathBuf::from(&self.config.path).join(name);
        if !source_path.exists() {
            return Err(IvError::new(ErrorCode::NotFound, "snapshot does not exist")
                .with_context("name", name));
        }

        let timestamp = timestamp_component(Utc::now());
        let pre_restore_name = format!("{}-pre-restore-{timestamp}.db", self.prefix);

        if self.db_path.exists() {
            let pre_restore_path = PathBuf::from(&self.config.path).join(&pre_restore_name);
            std::fs::create_dir_all(&self.config.path).ok();
            std::fs::copy(&self.db_path, &pre_restore_path).map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "failed to take pre-restore snapshot")
                    .with_source(e)
            })?;
        }

        if name.ends_with(".gz") {
            let tmp = tempfile::Builder::new()
                .suffix(".db")
                .tempfile()
                .map_err(|e| {
                    IvError::new(ErrorCode::ProcessingError, "failed to create temp file for restore")
                        .with_source(e)
                })?;
            let tmp_path = tmp.into_temp_path();
            let compressor = MessageCompressor::new(CompressionAlgorithm::Gzip);
            compressor.decompress_file(&source_path, &tmp_path).map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "failed to decompress snapshot for restore")
                    .with_source(e)
            })?;
            std::fs::copy(&tmp_path, &self.db_path).map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "failed to copy restored database into place")
                    .with_source(e)
            })?;
            // Dropping removes the backing file; the temp path is single-use.
            drop(tmp_path);
        } else {
            std::fs::copy(&source_path, &self.db_path).map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "failed to copy restored database into place")
                    .with_source(e)
            })?;
        }

        info!(restored_from = name, "database restored from snapshot");

        Ok(RestoreOutcome {
            restored_from: name.to_string(),
            pre_restore_snapshot_name: pre_restore_name,
        })
    }

    /// Aggregate statistics across retained snapshots.
    pub fn stats(&self) -> IvResult<BackupStats> {
        let snapshots = self.collect_snapshots()?;
        if snapshots.is_empty() {
            return Ok(BackupStats::default());
        }
        let total_bytes = snapshots.iter().map(|s| s.size_bytes).sum();
        let oldest = snapshots.iter().map(|s| s.modified_at).min();
        let newest = snapshots.iter().map(|s| s.modified_at).max();
        let compressed_count = snapshots.iter().filter(|s| s.compressed).count();
        Ok(BackupStats {
            count: snapshots.len(),
            total_bytes,
            oldest,
            newest,
            compressed_count,
            uncompressed_count: snapshots.len() - compressed_count,
        })
    }
}

/// Render a timestamp as the backup-filename-safe component: an RFC 3339
/// string with `:` and `.` replaced by `-` (so it's filesystem-safe on
/// every target platform this might run on).
fn timestamp_component(at: DateTime<Utc>) -> String {
    at.to_rfc3339().replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config(backup_dir: &Path) -> BackupConfig {
        BackupConfig {
            enabled: true,
            interval_hours: 24,
            retention_days: 30,
            path: backup_dir.to_string_lossy().to_string(),
            compression_threshold_bytes: 5 * 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn snapshot_of_small_db_is_not_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        fs::write(&db_path, b"small contents").unwrap();
        let backup_dir = dir.path().join("backups");

        let sup = BackupSupervisor::new(&db_path, test_config(&backup_dir));
        let snapshot = sup.create_snapshot().await.unwrap();
        assert!(!snapshot.compressed);
        assert!(snapshot.name.ends_with(".db"));
    }

    #[tokio::test]
    async fn snapshot_above_threshold_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        fs::write(&db_path, vec![0u8; 1024]).unwrap();
        let backup_dir = dir.path().join("backups");

        let mut config = test_config(&backup_dir);
        config.compression_threshold_bytes = 100;
        let sup = BackupSupervisor::new(&db_path, config);
        let snapshot = sup.create_snapshot().await.unwrap();
        assert!(snapshot.compressed);
        assert!(snapshot.name.ends_with(".db.gz"));
    }

    #[tokio::test]
    async fn missing_live_database_aborts_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("does-not-exist.db");
        let backup_dir = dir.path().join("backups");
        let sup = BackupSupervisor::new(&db_path, test_config(&backup_dir));
        let err = sup.create_snapshot().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProcessingError);
    }

    #[tokio::test]
    async fn restore_round_trips_and_leaves_a_pre_restore_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        let backup_dir = dir.path().join("backups");
        fs::write(&db_path, b"state A").unwrap();

        let sup = BackupSupervisor::new(&db_path, test_config(&backup_dir));
        let snapshot_a = sup.create_snapshot().await.unwrap();

        fs::write(&db_path, b"state B, mutated after snapshot").unwrap();

        let outcome = sup.restore(&snapshot_a.name).await.unwrap();
        assert_eq!(outcome.restored_from, snapshot_a.name);

        let restored = fs::read(&db_path).unwrap();
        assert_eq!(restored, b"state A");

        let pre_restore_path = backup_dir.join(&outcome.pre_restore_snapshot_name);
        let pre_restore_contents = fs::read(&pre_restore_path).unwrap();
        assert_eq!(pre_restore_contents, b"state B, mutated after snapshot");
    }

    #[tokio::test]
    async fn restore_missing_snapshot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        let backup_dir = dir.path().join("backups");
        fs::write(&db_path, b"x").unwrap();
        let sup = BackupSupervisor::new(&db_path, test_config(&backup_dir));
        let err = sup.restore("backup-nonexistent.db").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn cleanup_deletes_only_expired_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        let backup_dir = dir.path().join("backups");
        fs::write(&db_path, b"x").unwrap();
        fs::create_dir_all(&backup_dir).unwrap();

        let fresh_name = "backup-fresh.db";
        fs::write(backup_dir.join(fresh_name), b"fresh").unwrap();
        let stale_name = "backup-stale.db";
        let stale_path = backup_dir.join(stale_name);
        fs::write(&stale_path, b"stale").unwrap();

        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(40 * 86400);
        let old_filetime = filetime_from_system_time(old_time);
        set_mtime(&stale_path, old_filetime);

        let mut config = test_config(&backup_dir);
        config.retention_days = 30;
        let sup = BackupSupervisor::new(&db_path, config);

        let deleted = sup.cleanup().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(backup_dir.join(fresh_name).exists());
        assert!(!stale_path.exists());
    }

    #[test]
    fn stats_reports_counts_and_oldest_newest() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        let backup_dir = dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();
        fs::write(backup_dir.join("backup-a.db"), b"aaaa").unwrap();
        fs::write(backup_dir.join("backup-b.db.gz"), b"bb").unwrap();

        let sup = BackupSupervisor::new(&db_path, test_config(&backup_dir));
        let stats = sup.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.compressed_count, 1);
        assert_eq!(stats.uncompressed_count, 1);
    }

    #[test]
    fn timestamp_component_is_filesystem_safe() {
        let at = DateTime::parse_from_rfc3339("2026-07-27T10:30:00.123Z")
            .unwrap()
            .with_timezone(&Utc);
        let s = timestamp_component(at);
        assert!(!s.contains(':'));
        assert!(!s.contains('.'));
    }

    // Minimal mtime helper without pulling in a filetime crate dependency
    // just for this one test.
    fn filetime_from_system_time(t: std::time::SystemTime) -> std::time::SystemTime {
        t
    }

    fn set_mtime(path: &Path, t: std::time::SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(t).unwrap();
    }
}
