// AP Provisioner - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # AP Provisioner Models
//!
//! Shared types used across the provisioning pipeline:
//!
//! - **Config**: Validated AP parameters and persisted tool settings
//! - **Validation**: Input checks for SSIDs, addresses, channels
//! - **Report**: Per-stage outcome records for a run
//! - **Error**: Shared error types

pub mod config;
pub mod error;
pub mod report;
pub mod validation;

// Re-export main types for convenience
pub use config::{ApConfig, ApConfigInput, Passphrase, Paths, ProvisionerSettings};
pub use error::{Error, Result};
pub use report::{ProvisionReport, Stage, StageReport, StageStatus};

/// Daemon providing the 802.11 access point.
pub const AP_DAEMON: &str = "hostapd";

/// Daemon providing DHCP and DNS to clients.
pub const DHCP_DAEMON: &str = "dnsmasq";

/// Packages required on the host before configuration starts.
pub const REQUIRED_PACKAGES: &[&str] = &["hostapd", "dnsmasq", "iptables"];
