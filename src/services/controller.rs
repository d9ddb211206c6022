// AP Provisioner - Service Lifecycle
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Start/verify lifecycle for the managed daemons.
//!
//! Each daemon walks `Unconfigured -> Configured -> Starting -> Running
//! -> Verified`, with `Failed` reachable from `Starting` and `Running`.
//! The controller is the only thing that moves these states. Waits are
//! bounded poll loops that re-check the awaited condition instead of
//! trusting a fixed sleep; expiry fails the same way a refused start
//! does, with captured diagnostics.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::config::ProvisionerSettings;
use crate::models::error::{Error, Result};
use crate::models::{AP_DAEMON, DHCP_DAEMON};
use crate::network_utils;
use crate::runner::CommandRunner;
use crate::services::systemd::SystemdClient;
use crate::wireless;

/// Lifecycle state of one managed daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Unconfigured,
    Configured,
    Starting,
    Running,
    Verified,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }
}

/// Drives the managed daemons through their lifecycle.
pub struct ServiceController<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a ProvisionerSettings,
    states: BTreeMap<String, ServiceState>,
}

impl<'a> ServiceController<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a ProvisionerSettings) -> Self {
        let mut states = BTreeMap::new();
        states.insert(AP_DAEMON.to_string(), ServiceState::Unconfigured);
        states.insert(DHCP_DAEMON.to_string(), ServiceState::Unconfigured);
        Self {
            runner,
            settings,
            states,
        }
    }

    pub fn state(&self, unit: &str) -> ServiceState {
        self.states.get(unit).copied().unwrap_or_default()
    }

    fn set_state(&mut self, unit: &str, state: ServiceState) {
        debug!("{unit}: {}", state.as_str());
        self.states.insert(unit.to_string(), state);
    }

    /// Record that the daemon's configuration has been written.
    pub fn mark_configured(&mut self, unit: &str) {
        self.set_state(unit, ServiceState::Configured);
    }

    /// Unmask, enable, and start a daemon, then wait for it to report
    /// active. Any failure captures status and journal tail and surfaces
    /// them with the error.
    pub fn start(&mut self, unit: &str) -> Result<()> {
        // hostapd owns the interface association state dnsmasq binds to,
        // so dnsmasq must never start first.
        if unit == DHCP_DAEMON && self.state(AP_DAEMON) != ServiceState::Running {
            return Err(Error::service_start(
                unit,
                format!("{AP_DAEMON} is not running; refusing to start {unit}"),
            ));
        }
        if self.state(unit) != ServiceState::Configured {
            return Err(Error::service_start(
                unit,
                format!("{unit} has no configuration written; cannot start"),
            ));
        }

        self.set_state(unit, ServiceState::Starting);
        let systemd = SystemdClient::new(self.runner);

        if systemd.is_masked(unit) {
            info!("{unit} is masked; unmasking");
            if let Err(e) = systemd.unmask(unit) {
                return Err(self.fail(unit, &systemd, e));
            }
        }
        if let Err(e) = systemd.enable(unit) {
            return Err(self.fail(unit, &systemd, e));
        }
        if let Err(e) = systemd.start(unit) {
            return Err(self.fail(unit, &systemd, e));
        }

        if !self.poll_until(|| systemd.is_active(unit)) {
            let timeout = Error::VerificationTimeout(format!("{unit} to become active"));
            return Err(self.fail(unit, &systemd, timeout));
        }

        self.set_state(unit, ServiceState::Running);
        info!("{unit} is running");
        Ok(())
    }

    /// Confirm both daemons are active, the interface carries the AP
    /// address, and (best effort) the radio reports AP mode.
    ///
    /// Returns the non-fatal warnings collected along the way.
    pub fn verify(
        &mut self,
        ap_if: &str,
        ap_ip: Ipv4Addr,
        expected_ssid: &str,
    ) -> Result<Vec<String>> {
        let systemd = SystemdClient::new(self.runner);
        let mut warnings = Vec::new();

        for unit in [AP_DAEMON, DHCP_DAEMON] {
            if !self.poll_until(|| systemd.is_active(unit)) {
                self.set_state(unit, ServiceState::Failed);
                return Err(Error::VerificationTimeout(format!(
                    "{unit} to report active"
                )));
            }
        }

        if !self.poll_until(|| {
            network_utils::interface_ipv4_addresses(self.runner, ap_if).contains(&ap_ip)
        }) {
            return Err(Error::VerificationTimeout(format!(
                "{ap_if} to carry {ap_ip}"
            )));
        }

        // Radio mode reporting is flaky right after activation; anything
        // short of a clean answer stays a warning.
        match wireless::interface_info(self.runner, ap_if) {
            Ok(info) if info.is_ap_mode() => {
                match info.ssid.as_deref() {
                    Some(ssid) if ssid == expected_ssid => {
                        info!("{ap_if} is in AP mode broadcasting {ssid}");
                    }
                    Some(ssid) => warnings.push(format!(
                        "{ap_if} broadcasts \"{ssid}\" instead of \"{expected_ssid}\""
                    )),
                    None => warnings.push(format!(
                        "{ap_if} is in AP mode but reports no SSID yet"
                    )),
                }
            }
            Ok(info) => warnings.push(format!(
                "{ap_if} reports mode {} rather than AP; some drivers settle late",
                info.iftype.as_deref().unwrap_or("unknown")
            )),
            Err(e) => warnings.push(format!("could not confirm radio mode: {e}")),
        }

        for warning in &warnings {
            warn!("{warning}");
        }

        self.set_state(AP_DAEMON, ServiceState::Verified);
        self.set_state(DHCP_DAEMON, ServiceState::Verified);
        Ok(warnings)
    }

    fn fail(&mut self, unit: &str, systemd: &SystemdClient<'_>, cause: Error) -> Error {
        self.set_state(unit, ServiceState::Failed);
        let mut diagnostics = format!("{cause}");
        let captured = systemd.diagnostics(unit);
        if !captured.is_empty() {
            diagnostics.push_str("\n\n");
            diagnostics.push_str(&captured);
        }
        Error::service_start(unit, diagnostics)
    }

    /// Re-check `condition` with backoff until it holds or the settle
    /// timeout expires. Always checks at least once.
    fn poll_until(&self, mut condition: impl FnMut() -> bool) -> bool {
        let timeout = Duration::from_secs(self.settings.settle_timeout_secs);
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let started = Instant::now();
        loop {
            if condition() {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(interval);
        }
    }
}
