// AP Provisioner - Package Availability
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Presence checks and installation of the required daemons.
//!
//! Targets Debian-family images (Raspberry Pi OS, Radxa's Debian builds),
//! so the queries go through dpkg and apt-get.

use tracing::{info, warn};

use crate::models::error::{Error, Result};
use crate::runner::CommandRunner;

pub struct PackageManager<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> PackageManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Whether dpkg reports the package fully installed.
    pub fn is_installed(&self, package: &str) -> bool {
        self.runner
            .run("dpkg-query", &["-W", "-f=${Status}", package])
            .map(|o| o.success && o.stdout.contains("install ok installed"))
            .unwrap_or(false)
    }

    /// Install whatever is missing from `packages`.
    ///
    /// Returns the packages that were actually installed, empty when
    /// everything was already present.
    pub fn ensure_installed(&self, packages: &[&str]) -> Result<Vec<String>> {
        let missing: Vec<&str> = packages
            .iter()
            .copied()
            .filter(|p| !self.is_installed(p))
            .collect();

        if missing.is_empty() {
            info!("all required packages present");
            return Ok(Vec::new());
        }

        if !self.runner.has_command("apt-get") {
            return Err(Error::PackageInstallFailed {
                package: missing.join(", "),
                reason: "apt-get not found on this system".to_string(),
            });
        }

        info!("installing missing packages: {}", missing.join(", "));

        // A stale package index is common on freshly flashed images;
        // refresh it but do not fail the run if the refresh itself fails.
        if let Ok(output) = self.runner.run("apt-get", &["update"]) {
            if !output.success {
                warn!("apt-get update failed: {}", output.combined());
            }
        }

        let mut args = vec!["install", "-y"];
        args.extend(&missing);
        self.runner
            .run_ok("apt-get", &args)
            .map_err(|e| Error::PackageInstallFailed {
                package: missing.join(", "),
                reason: e.to_string(),
            })?;

        Ok(missing.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    fn mark_installed(runner: &FakeRunner, package: &str) {
        runner.ok(
            &format!("dpkg-query -W -f=${{Status}} {package}"),
            "install ok installed\n",
        );
    }

    fn mark_missing(runner: &FakeRunner, package: &str) {
        runner.fail(
            &format!("dpkg-query -W -f=${{Status}} {package}"),
            &format!("dpkg-query: no packages found matching {package}"),
        );
    }

    #[test]
    fn test_all_present_installs_nothing() {
        let runner = FakeRunner::new();
        for p in ["hostapd", "dnsmasq", "iptables"] {
            mark_installed(&runner, p);
        }

        let installed = PackageManager::new(&runner)
            .ensure_installed(&["hostapd", "dnsmasq", "iptables"])
            .unwrap();
        assert!(installed.is_empty());
        assert!(!runner.called("apt-get"));
    }

    #[test]
    fn test_installs_only_missing() {
        let runner = FakeRunner::new();
        mark_installed(&runner, "hostapd");
        mark_missing(&runner, "dnsmasq");
        mark_installed(&runner, "iptables");

        let installed = PackageManager::new(&runner)
            .ensure_installed(&["hostapd", "dnsmasq", "iptables"])
            .unwrap();
        assert_eq!(installed, vec!["dnsmasq"]);
        assert!(runner.called("apt-get install -y dnsmasq"));
        assert!(!runner.called("install -y hostapd"));
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let runner = FakeRunner::new();
        mark_missing(&runner, "hostapd");
        runner.fail(
            "apt-get install -y hostapd",
            "E: Unable to locate package hostapd",
        );

        let err = PackageManager::new(&runner)
            .ensure_installed(&["hostapd"])
            .unwrap_err();
        assert!(matches!(err, Error::PackageInstallFailed { .. }));
        assert!(err.to_string().contains("hostapd"));
    }

    #[test]
    fn test_missing_apt_get_is_fatal() {
        let runner = FakeRunner::new().without_command("apt-get");
        mark_missing(&runner, "dnsmasq");

        let err = PackageManager::new(&runner)
            .ensure_installed(&["dnsmasq"])
            .unwrap_err();
        assert!(err.to_string().contains("apt-get not found"));
    }

    #[test]
    fn test_update_failure_is_soft() {
        let runner = FakeRunner::new();
        mark_missing(&runner, "dnsmasq");
        runner.fail("apt-get update", "Could not resolve 'deb.debian.org'");

        let installed = PackageManager::new(&runner)
            .ensure_installed(&["dnsmasq"])
            .unwrap();
        assert_eq!(installed, vec!["dnsmasq"]);
    }
}
