// AP Provisioner - NAT and Forwarding
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! IPv4 forwarding and the iptables NAT rule set.
//!
//! Forwarding is enabled twice on purpose: a sysctl drop-in makes it
//! survive reboots while a direct write to the live /proc toggle makes it
//! effective immediately. The rule set is rebuilt from a flushed baseline
//! every run, so stale rules from earlier attempts never linger.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::models::config::ProvisionerSettings;
use crate::models::error::{Error, Result};
use crate::network_utils;
use crate::runner::CommandRunner;

/// What NAT setup ended up doing, for reporting.
#[derive(Debug, Clone)]
pub struct NatSummary {
    /// Interface the MASQUERADE rule was installed on.
    pub upstream: String,
    /// False when the default route was missing and the configured
    /// fallback name was used instead.
    pub upstream_from_route: bool,
    /// Whether the rule set was persisted for the next boot.
    pub persisted: bool,
}

/// Programs forwarding and the firewall for one AP interface.
pub struct NatManager<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a ProvisionerSettings,
}

impl<'a> NatManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a ProvisionerSettings) -> Self {
        Self { runner, settings }
    }

    /// Enable forwarding and install the NAT/filter rules for `ap_if`.
    pub fn enable_forwarding(&self, ap_if: &str) -> Result<NatSummary> {
        self.persist_forwarding_flag()?;
        self.apply_forwarding_flag()?;

        let (upstream, upstream_from_route) = self.upstream_interface();
        if !upstream_from_route {
            warn!(
                "no default route found; assuming {} carries internet traffic",
                upstream
            );
        }

        self.reset_tables()?;
        self.install_rules(&upstream, ap_if)?;
        let persisted = self.persist_rules()?;

        Ok(NatSummary {
            upstream,
            upstream_from_route,
            persisted,
        })
    }

    /// Write the boot-time sysctl drop-in.
    fn persist_forwarding_flag(&self) -> Result<()> {
        let path = &self.settings.paths.sysctl_dropin;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::write_failed(parent, e.to_string()))?;
        }
        fs::write(path, "net.ipv4.ip_forward=1\n")
            .map_err(|e| Error::write_failed(path, e.to_string()))?;
        debug!("forwarding persisted via {}", path.display());
        Ok(())
    }

    /// Flip the live /proc toggle so forwarding works without a reboot.
    fn apply_forwarding_flag(&self) -> Result<()> {
        let path = &self.settings.paths.proc_forward;
        fs::write(path, "1").map_err(|e| Error::write_failed(path, e.to_string()))?;
        debug!("forwarding enabled via {}", path.display());
        Ok(())
    }

    /// Interface carrying the default route, or the configured fallback.
    fn upstream_interface(&self) -> (String, bool) {
        match network_utils::default_route_device(self.runner) {
            Some(device) => (device, true),
            None => (self.settings.fallback_upstream.clone(), false),
        }
    }

    /// Flush nat, mangle, and filter back to a clean baseline.
    fn reset_tables(&self) -> Result<()> {
        for args in [
            &["-t", "nat", "-F"][..],
            &["-t", "mangle", "-F"][..],
            &["-F"][..],
            &["-X"][..],
        ] {
            self.iptables(args)?;
        }
        debug!("iptables tables flushed");
        Ok(())
    }

    fn install_rules(&self, upstream: &str, ap_if: &str) -> Result<()> {
        // Outbound NAT on the upstream side
        self.iptables(&[
            "-t",
            "nat",
            "-A",
            "POSTROUTING",
            "-o",
            upstream,
            "-j",
            "MASQUERADE",
        ])?;
        // Return traffic for connections the AP clients opened
        self.iptables(&[
            "-A",
            "FORWARD",
            "-i",
            upstream,
            "-o",
            ap_if,
            "-m",
            "state",
            "--state",
            "RELATED,ESTABLISHED",
            "-j",
            "ACCEPT",
        ])?;
        // New traffic from AP clients toward the internet
        self.iptables(&["-A", "FORWARD", "-i", ap_if, "-o", upstream, "-j", "ACCEPT"])?;
        // Local DHCP/DNS service on the AP interface
        self.iptables(&["-A", "INPUT", "-i", ap_if, "-j", "ACCEPT"])?;
        self.iptables(&["-A", "OUTPUT", "-o", ap_if, "-j", "ACCEPT"])?;

        info!("NAT rules installed: {} -> {}", ap_if, upstream);
        Ok(())
    }

    /// Save the rule set for the next boot, if a mechanism exists.
    ///
    /// Missing persistence tooling is a warning: the rules stay active
    /// for the current boot either way.
    fn persist_rules(&self) -> Result<bool> {
        if self.runner.has_command("netfilter-persistent") {
            self.runner
                .run_ok("netfilter-persistent", &["save"])
                .map_err(|e| Error::rule_install("persist rules", e.to_string()))?;
            info!("rules persisted via netfilter-persistent");
            return Ok(true);
        }

        if self.runner.has_command("iptables-save") {
            let output = self
                .runner
                .run_ok("iptables-save", &[])
                .map_err(|e| Error::rule_install("iptables-save", e.to_string()))?;
            let path = &self.settings.paths.iptables_rules;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::write_failed(parent, e.to_string()))?;
            }
            fs::write(path, output.stdout)
                .map_err(|e| Error::write_failed(path, e.to_string()))?;
            info!("rules persisted to {}", path.display());
            return Ok(true);
        }

        warn!("no persistence tool found; rules are active for this boot only");
        Ok(false)
    }

    fn iptables(&self, args: &[&str]) -> Result<()> {
        self.runner.run_ok("iptables", args).map_err(|e| {
            Error::rule_install(format!("iptables {}", args.join(" ")), e.to_string())
        })?;
        Ok(())
    }
}

/// Read the live forwarding flag, for status display.
pub fn forwarding_enabled(proc_forward: &Path) -> Option<bool> {
    fs::read_to_string(proc_forward)
        .ok()
        .map(|s| s.trim() == "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::Paths;
    use crate::runner::fake::FakeRunner;

    fn test_settings(root: &Path) -> ProvisionerSettings {
        let settings = ProvisionerSettings {
            paths: Paths::under(root),
            ..ProvisionerSettings::default()
        };
        // The live toggle sits under /proc on a real host; tests point it
        // at a plain file.
        fs::create_dir_all(settings.paths.proc_forward.parent().unwrap()).unwrap();
        fs::write(&settings.paths.proc_forward, "0").unwrap();
        settings
    }

    fn route_output() -> &'static str {
        "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n"
    }

    #[test]
    fn test_enable_forwarding_full_pass() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let runner = FakeRunner::new();
        runner.ok("ip route show default", route_output());

        let summary = NatManager::new(&runner, &settings)
            .enable_forwarding("wlan0")
            .unwrap();

        assert_eq!(summary.upstream, "eth0");
        assert!(summary.upstream_from_route);
        assert!(summary.persisted);

        // Both forwarding writes happened
        assert_eq!(
            fs::read_to_string(&settings.paths.sysctl_dropin).unwrap(),
            "net.ipv4.ip_forward=1\n"
        );
        assert_eq!(fs::read_to_string(&settings.paths.proc_forward).unwrap(), "1");

        // Flush before install, MASQUERADE on the upstream side
        let calls = runner.calls();
        let flush_pos = calls.iter().position(|c| c == "iptables -t nat -F").unwrap();
        let masq_pos = calls
            .iter()
            .position(|c| c.contains("POSTROUTING -o eth0 -j MASQUERADE"))
            .unwrap();
        assert!(flush_pos < masq_pos);
        assert!(runner.called("FORWARD -i eth0 -o wlan0 -m state --state RELATED,ESTABLISHED -j ACCEPT"));
        assert!(runner.called("FORWARD -i wlan0 -o eth0 -j ACCEPT"));
        assert!(runner.called("INPUT -i wlan0 -j ACCEPT"));
        assert!(runner.called("OUTPUT -o wlan0 -j ACCEPT"));
        assert!(runner.called("netfilter-persistent save"));
    }

    #[test]
    fn test_fallback_upstream_when_no_route() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let runner = FakeRunner::new();
        runner.ok("ip route show default", "");

        let summary = NatManager::new(&runner, &settings)
            .enable_forwarding("wlan0")
            .unwrap();
        assert_eq!(summary.upstream, "eth0");
        assert!(!summary.upstream_from_route);
        assert!(runner.called("POSTROUTING -o eth0 -j MASQUERADE"));
    }

    #[test]
    fn test_rule_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let runner = FakeRunner::new();
        runner.ok("ip route show default", route_output());
        runner.fail(
            "iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE",
            "iptables: Permission denied",
        );

        let err = NatManager::new(&runner, &settings)
            .enable_forwarding("wlan0")
            .unwrap_err();
        assert!(matches!(err, Error::RuleInstallFailed { .. }));
        assert!(err.to_string().contains("MASQUERADE"));
    }

    #[test]
    fn test_persist_falls_back_to_iptables_save() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let runner = FakeRunner::new().without_command("netfilter-persistent");
        runner.ok("ip route show default", route_output());
        runner.ok("iptables-save", "*nat\n-A POSTROUTING -o eth0 -j MASQUERADE\nCOMMIT\n");

        let summary = NatManager::new(&runner, &settings)
            .enable_forwarding("wlan0")
            .unwrap();
        assert!(summary.persisted);
        let saved = fs::read_to_string(&settings.paths.iptables_rules).unwrap();
        assert!(saved.contains("MASQUERADE"));
    }

    #[test]
    fn test_missing_persistence_tools_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let runner = FakeRunner::new()
            .without_command("netfilter-persistent")
            .without_command("iptables-save");
        runner.ok("ip route show default", route_output());

        let summary = NatManager::new(&runner, &settings)
            .enable_forwarding("wlan0")
            .unwrap();
        assert!(!summary.persisted);
    }

    #[test]
    fn test_forwarding_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("ip_forward");
        assert!(forwarding_enabled(&flag).is_none());
        fs::write(&flag, "1\n").unwrap();
        assert_eq!(forwarding_enabled(&flag), Some(true));
        fs::write(&flag, "0\n").unwrap();
        assert_eq!(forwarding_enabled(&flag), Some(false));
    }
}
