// AP Provisioner - Configuration Backups
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Snapshots of configuration files before they are overwritten.
//!
//! Every run gets its own group of [`BackupRecord`]s in a JSON manifest
//! under the state directory, so `rollback` can later restore the files
//! a run replaced. Snapshots are best-effort: a failed copy is surfaced
//! to the caller, which logs it and keeps the pipeline going.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::error::{Error, Result};

/// Manifest file name inside the state directory.
pub const MANIFEST_FILE: &str = "backups.json";

/// One file snapshotted before an overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// All snapshots taken by a single provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRun {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub records: Vec<BackupRecord>,
}

/// Takes snapshots for one run and keeps the manifest current.
pub struct BackupManager {
    state_dir: PathBuf,
    run: BackupRun,
}

impl BackupManager {
    pub fn new(state_dir: impl Into<PathBuf>, run_id: Uuid) -> Self {
        Self {
            state_dir: state_dir.into(),
            run: BackupRun {
                run_id,
                created_at: Utc::now(),
                records: Vec::new(),
            },
        }
    }

    /// Copy `path` to a timestamp-suffixed sibling and record it.
    ///
    /// Returns `Ok(None)` when the file does not exist (nothing to keep)
    /// or was already snapshotted during this run.
    pub fn snapshot(&mut self, path: &Path) -> Result<Option<BackupRecord>> {
        if !path.exists() {
            debug!("no backup needed, {} does not exist", path.display());
            return Ok(None);
        }
        if self.run.records.iter().any(|r| r.original == path) {
            debug!("{} already snapshotted this run", path.display());
            return Ok(None);
        }

        let now = Utc::now();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string());
        let backup_name = format!("{}.bak.{}", file_name, now.format("%Y%m%d-%H%M%S"));
        let backup_path = path.with_file_name(backup_name);

        fs::copy(path, &backup_path).map_err(|e| Error::ConfigWriteFailed {
            path: backup_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let record = BackupRecord {
            original: path.to_path_buf(),
            backup: backup_path,
            created_at: now,
        };
        info!(
            "backed up {} to {}",
            record.original.display(),
            record.backup.display()
        );
        self.run.records.push(record.clone());

        // Write-through so an interrupted run still leaves a usable manifest
        self.persist()?;
        Ok(Some(record))
    }

    /// Snapshots taken so far in this run.
    pub fn records(&self) -> &[BackupRecord] {
        &self.run.records
    }

    fn persist(&self) -> Result<()> {
        let mut runs = load_manifest(&self.state_dir)?;
        runs.retain(|r| r.run_id != self.run.run_id);
        runs.push(self.run.clone());
        save_manifest(&self.state_dir, &runs)
    }
}

/// Restore the files snapshotted by the most recent run.
///
/// Copies each backup over its original and returns the restored paths.
/// Backups that have since disappeared are skipped with a warning.
pub fn restore_latest(state_dir: &Path) -> Result<Vec<PathBuf>> {
    let runs = load_manifest(state_dir)?;
    let latest = runs
        .iter()
        .max_by_key(|r| r.created_at)
        .ok_or(Error::NoBackupsFound)?;

    info!(
        "restoring {} file(s) from run {}",
        latest.records.len(),
        latest.run_id
    );

    let mut restored = Vec::new();
    for record in &latest.records {
        if !record.backup.exists() {
            warn!("backup {} is gone, skipping", record.backup.display());
            continue;
        }
        fs::copy(&record.backup, &record.original).map_err(|e| Error::ConfigWriteFailed {
            path: record.original.display().to_string(),
            reason: e.to_string(),
        })?;
        info!("restored {}", record.original.display());
        restored.push(record.original.clone());
    }
    Ok(restored)
}

/// Read the manifest, tolerating its absence.
pub fn load_manifest(state_dir: &Path) -> Result<Vec<BackupRun>> {
    let path = state_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(&path).map_err(|e| Error::ConfigReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn save_manifest(state_dir: &Path, runs: &[BackupRun]) -> Result<()> {
    fs::create_dir_all(state_dir).map_err(|e| Error::ConfigWriteFailed {
        path: state_dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let path = state_dir.join(MANIFEST_FILE);
    let file = File::create(&path).map_err(|e| Error::ConfigWriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, runs)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
