// AP Provisioner - Run Reports
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Per-stage outcome tracking for a provisioning run.
//!
//! The orchestrator records a [`StageReport`] after every stage and writes
//! the whole [`ProvisionReport`] to disk each time, so an interrupted run
//! still leaves an accurate record of how far it got.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Error, Result};

/// File name of the persisted report inside the state directory.
pub const LAST_RUN_FILE: &str = "last-run.json";

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Run still in progress.
    Running,
    Success,
    /// Completed, but something needs operator attention.
    Warning,
    Error,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Running => "…",
            Self::Success => "✔",
            Self::Warning => "⚠",
            Self::Error => "✖",
            Self::Skipped => "↷",
        }
    }
}

/// Stages of the provisioning pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Privilege,
    Detect,
    Packages,
    Backup,
    Disconnect,
    HostapdConfig,
    DnsmasqConfig,
    DhcpcdConfig,
    Nat,
    ServiceStart,
    Verify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Privilege => "privilege",
            Self::Detect => "detect",
            Self::Packages => "packages",
            Self::Backup => "backup",
            Self::Disconnect => "disconnect",
            Self::HostapdConfig => "hostapd-config",
            Self::DnsmasqConfig => "dnsmasq-config",
            Self::DhcpcdConfig => "dhcpcd-config",
            Self::Nat => "nat",
            Self::ServiceStart => "service-start",
            Self::Verify => "verify",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Privilege => "Privilege Check",
            Self::Detect => "Interface Detection",
            Self::Packages => "Package Installation",
            Self::Backup => "Configuration Backup",
            Self::Disconnect => "Client Disconnect",
            Self::HostapdConfig => "hostapd Configuration",
            Self::DnsmasqConfig => "dnsmasq Configuration",
            Self::DhcpcdConfig => "dhcpcd Configuration",
            Self::Nat => "NAT and Forwarding",
            Self::ServiceStart => "Service Start",
            Self::Verify => "Verification",
        }
    }
}

/// Record of one completed (or skipped) stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
    /// Extra diagnostics, e.g. captured service output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StageReport {
    fn with_status(stage: Stage, status: StageStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            detail: None,
            duration_ms: 0,
            recorded_at: Utc::now(),
        }
    }

    pub fn success(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Success, message)
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Warning, message)
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Error, message)
    }

    pub fn skipped(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Skipped, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn failed(&self) -> bool {
        self.status == StageStatus::Error
    }
}

/// Full record of one provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: StageStatus,
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub ap_ip: String,
    pub stages: Vec<StageReport>,
    /// Set when backups were restored after a failed run.
    #[serde(default)]
    pub rolled_back: bool,
}

impl ProvisionReport {
    pub fn new(ssid: impl Into<String>, ap_ip: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: StageStatus::Running,
            ssid: ssid.into(),
            interface: None,
            ap_ip: ap_ip.into(),
            stages: Vec::new(),
            rolled_back: false,
        }
    }

    pub fn record(&mut self, stage: StageReport) {
        self.stages.push(stage);
    }

    /// Worst stage outcome: error beats warning beats success.
    pub fn overall(&self) -> StageStatus {
        if self.stages.iter().any(|s| s.status == StageStatus::Error) {
            StageStatus::Error
        } else if self.stages.iter().any(|s| s.status == StageStatus::Warning) {
            StageStatus::Warning
        } else {
            StageStatus::Success
        }
    }

    /// Close the run and fold stage outcomes into the overall status.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = self.overall();
    }

    /// Write the report into the state directory.
    pub fn save(&self, state_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(state_dir).map_err(|e| Error::ConfigWriteFailed {
            path: state_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = state_dir.join(LAST_RUN_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| Error::ConfigWriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    /// Read the most recent report, if any run has happened.
    pub fn load_last(state_dir: &Path) -> Result<Option<Self>> {
        let path = state_dir.join(LAST_RUN_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::ConfigReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_prefers_worst_status() {
        let mut report = ProvisionReport::new("RadxaAP", "192.168.4.1");
        report.record(StageReport::success(Stage::Privilege, "running as root"));
        assert_eq!(report.overall(), StageStatus::Success);

        report.record(StageReport::warning(Stage::Nat, "rules not persisted"));
        assert_eq!(report.overall(), StageStatus::Warning);

        report.record(StageReport::error(Stage::Verify, "hostapd inactive"));
        assert_eq!(report.overall(), StageStatus::Error);
    }

    #[test]
    fn test_finalize_sets_finished() {
        let mut report = ProvisionReport::new("RadxaAP", "192.168.4.1");
        report.record(StageReport::success(Stage::Detect, "selected wlan0"));
        assert!(report.finished_at.is_none());
        report.finalize();
        assert!(report.finished_at.is_some());
        assert_eq!(report.status, StageStatus::Success);
    }

    #[test]
    fn test_save_and_load_last() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProvisionReport::load_last(dir.path()).unwrap().is_none());

        let mut report = ProvisionReport::new("RadxaAP", "192.168.4.1");
        report.interface = Some("wlan0".to_string());
        report.record(
            StageReport::success(Stage::HostapdConfig, "wrote hostapd.conf")
                .with_duration(Duration::from_millis(12)),
        );
        report.finalize();
        report.save(dir.path()).unwrap();

        let loaded = ProvisionReport::load_last(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.interface.as_deref(), Some("wlan0"));
        assert_eq!(loaded.stages.len(), 1);
        assert_eq!(loaded.stages[0].stage, Stage::HostapdConfig);
        assert_eq!(loaded.stages[0].duration_ms, 12);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ServiceStart.as_str(), "service-start");
        assert_eq!(Stage::Nat.display_name(), "NAT and Forwarding");
        assert_eq!(StageStatus::Warning.glyph(), "⚠");
    }
}
