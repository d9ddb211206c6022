// AP Provisioner - Run Lock
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Single-run guard backed by a pid file.
//!
//! Two provisioning runs racing over the same config files and firewall
//! tables would interleave destructively, so a run takes the lock before
//! touching the host. A lock left behind by a crashed run is detected by
//! checking whether its pid is still alive and reclaimed automatically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::models::error::{Error, Result};

/// Holds the run lock; removes the pid file on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("could not remove lock file {}: {e}", self.path.display());
        }
    }
}

/// Take the run lock, reclaiming it if the recorded owner is dead.
pub fn acquire(lock_path: &Path) -> Result<LockGuard> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| lock_io_error(lock_path, e))?;
    }

    match try_create(lock_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let owner = read_owner(lock_path);
            match owner {
                Some(pid) if pid_alive(pid) => {
                    return Err(Error::AlreadyRunning {
                        pid,
                        lock_path: lock_path.display().to_string(),
                    });
                }
                Some(pid) => {
                    warn!("reclaiming stale lock left by dead pid {pid}");
                    fs::remove_file(lock_path)?;
                    try_create(lock_path).map_err(|e| lock_io_error(lock_path, e))?;
                }
                None => {
                    warn!("reclaiming unreadable lock file {}", lock_path.display());
                    fs::remove_file(lock_path)?;
                    try_create(lock_path).map_err(|e| lock_io_error(lock_path, e))?;
                }
            }
        }
        Err(e) => return Err(lock_io_error(lock_path, e)),
    }

    debug!("acquired run lock at {}", lock_path.display());
    Ok(LockGuard {
        path: lock_path.to_path_buf(),
    })
}

/// The lock lives under /run, so the usual reason creation fails is a
/// run without sudo; surface that as a privilege problem, not raw io.
fn lock_io_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::PrivilegeRequired(format!(
            "cannot create lock file {}; re-run with sudo",
            path.display()
        ))
    } else {
        e.into()
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}
