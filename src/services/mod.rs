// AP Provisioner - System Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Interaction with the host's service layer.
//!
//! This module contains the pieces that talk to systemd and dpkg:
//! - Systemd: thin wrapper over systemctl/journalctl
//! - Packages: presence checks and installation via apt
//! - Controller: start/verify lifecycle for the managed daemons

pub mod controller;
pub mod packages;
pub mod systemd;

pub use controller::{ServiceController, ServiceState};
pub use packages::PackageManager;
pub use systemd::SystemdClient;
