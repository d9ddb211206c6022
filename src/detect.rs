// AP Provisioner - Interface Detection
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Wireless interface selection.
//!
//! Enumerates the host's wireless interfaces, picks one deterministically,
//! and confirms the radio can actually run an access point. Selection is
//! lexicographic by name rather than enumeration order, so the same board
//! always provisions the same radio.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::models::error::{Error, Result};
use crate::network_utils;
use crate::runner::CommandRunner;
use crate::wireless::{self, ApSupport, InterfaceInfo};

/// Outcome of a detection pass.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Name of the selected interface.
    pub interface: String,
    /// Radio state as reported by iw.
    pub info: InterfaceInfo,
    /// Non-fatal findings, e.g. unused candidates or ambiguous capability.
    pub warnings: Vec<String>,
}

/// Finds and vets the interface the access point will run on.
pub struct InterfaceDetector<'a> {
    runner: &'a dyn CommandRunner,
    sysfs_net: &'a Path,
}

impl<'a> InterfaceDetector<'a> {
    pub fn new(runner: &'a dyn CommandRunner, sysfs_net: &'a Path) -> Self {
        Self { runner, sysfs_net }
    }

    /// Select the wireless interface to provision.
    ///
    /// Zero candidates is fatal. With several, the lexicographically
    /// first wins and the rest are named in a warning. The winner must be
    /// queryable through nl80211 and its radio must not definitively deny
    /// AP support; an unclear capability answer is only a warning.
    pub fn detect(&self) -> Result<Detection> {
        let candidates = network_utils::list_wireless_interfaces(self.sysfs_net);
        debug!("wireless candidates: {candidates:?}");

        let Some(interface) = candidates.first().cloned() else {
            return Err(Error::NoInterfaceFound);
        };

        let mut warnings = Vec::new();
        if candidates.len() > 1 {
            let unused = candidates[1..].join(", ");
            warnings.push(format!(
                "multiple wireless interfaces present; using {interface}, leaving {unused} untouched"
            ));
        }

        let info = wireless::interface_info(self.runner, &interface)?;
        if let Some(state) = network_utils::operstate(self.sysfs_net, &interface) {
            debug!("{interface} operstate: {state}");
        }

        match wireless::ap_mode_support(self.runner, &info) {
            ApSupport::Supported => {
                debug!("{interface} radio advertises AP mode");
            }
            ApSupport::Unsupported => {
                return Err(Error::InterfaceUnusable(format!(
                    "{interface}: radio does not advertise AP mode"
                )));
            }
            ApSupport::Unknown => {
                warnings.push(format!(
                    "could not confirm {interface} supports AP mode; continuing anyway"
                ));
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        info!("selected wireless interface {interface}");

        Ok(Detection {
            interface,
            info,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    const PHY_INFO_WITH_AP: &str = concat!(
        "Wiphy phy0\n",
        "\tSupported interface modes:\n",
        "\t\t * managed\n",
        "\t\t * AP\n",
        "\tBand 1:\n",
    );

    const PHY_INFO_NO_AP: &str = concat!(
        "Wiphy phy0\n",
        "\tSupported interface modes:\n",
        "\t\t * managed\n",
        "\tBand 1:\n",
    );

    fn fake_sysfs(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            let iface = dir.path().join(name);
            fs::create_dir_all(iface.join("wireless")).unwrap();
            fs::write(iface.join("operstate"), "down\n").unwrap();
        }
        dir
    }

    fn dev_info(name: &str) -> String {
        format!("Interface {name}\n\ttype managed\n\twiphy 0\n")
    }

    #[test]
    fn test_no_interfaces_is_fatal() {
        let sysfs = fake_sysfs(&[]);
        let runner = FakeRunner::new();
        let detector = InterfaceDetector::new(&runner, sysfs.path());
        assert!(matches!(
            detector.detect().unwrap_err(),
            Error::NoInterfaceFound
        ));
    }

    #[test]
    fn test_single_interface_selected() {
        let sysfs = fake_sysfs(&["wlan0"]);
        let runner = FakeRunner::new();
        runner.ok("iw dev wlan0 info", &dev_info("wlan0"));
        runner.ok("iw phy phy0 info", PHY_INFO_WITH_AP);

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        let detection = detector.detect().unwrap();
        assert_eq!(detection.interface, "wlan0");
        assert!(detection.warnings.is_empty());
    }

    #[test]
    fn test_multiple_interfaces_pick_first_and_warn() {
        let sysfs = fake_sysfs(&["wlanB", "wlanA"]);
        let runner = FakeRunner::new();
        runner.ok("iw dev wlanA info", &dev_info("wlanA"));
        runner.ok("iw phy phy0 info", PHY_INFO_WITH_AP);

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        let detection = detector.detect().unwrap();
        assert_eq!(detection.interface, "wlanA");
        assert_eq!(detection.warnings.len(), 1);
        assert!(detection.warnings[0].contains("wlanB"));
    }

    #[test]
    fn test_unqueryable_interface_is_unusable() {
        let sysfs = fake_sysfs(&["wlan0"]);
        let runner = FakeRunner::new();
        runner.fail("iw dev wlan0 info", "command failed: No such device (-19)");

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        assert!(matches!(
            detector.detect().unwrap_err(),
            Error::InterfaceUnusable(_)
        ));
    }

    #[test]
    fn test_radio_without_ap_mode_is_unusable() {
        let sysfs = fake_sysfs(&["wlan0"]);
        let runner = FakeRunner::new();
        runner.ok("iw dev wlan0 info", &dev_info("wlan0"));
        runner.ok("iw phy phy0 info", PHY_INFO_NO_AP);

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        let err = detector.detect().unwrap_err();
        assert!(matches!(err, Error::InterfaceUnusable(_)));
        assert!(err.to_string().contains("AP mode"));
    }

    #[test]
    fn test_ambiguous_capability_is_warning() {
        let sysfs = fake_sysfs(&["wlan0"]);
        let runner = FakeRunner::new();
        // No wiphy line, so the capability query cannot even be made
        runner.ok("iw dev wlan0 info", "Interface wlan0\n\ttype managed\n");

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        let detection = detector.detect().unwrap();
        assert_eq!(detection.interface, "wlan0");
        assert!(detection.warnings.iter().any(|w| w.contains("confirm")));
    }

    #[test]
    fn test_pci_style_names_are_accepted() {
        let sysfs = fake_sysfs(&["wlP2p33s0"]);
        let runner = FakeRunner::new();
        runner.ok(
            "iw dev wlP2p33s0 info",
            "Interface wlP2p33s0\n\ttype managed\n\twiphy 0\n",
        );
        runner.ok("iw phy phy0 info", PHY_INFO_WITH_AP);

        let detector = InterfaceDetector::new(&runner, sysfs.path());
        let detection = detector.detect().unwrap();
        assert_eq!(detection.interface, "wlP2p33s0");
    }
}
