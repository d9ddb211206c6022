// AP Provisioner - Service Supervision
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Thin systemctl/journalctl wrapper.
//!
//! All supervision goes through systemd on the target images. Queries
//! that merely observe state swallow command failures and report the
//! conservative answer; mutations propagate errors to the caller.

use tracing::debug;

use crate::models::error::Result;
use crate::runner::CommandRunner;

/// Lines of journal captured for a failure diagnosis.
const JOURNAL_TAIL_LINES: &str = "25";

pub struct SystemdClient<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> SystemdClient<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Whether the unit reports `active`.
    pub fn is_active(&self, unit: &str) -> bool {
        self.runner
            .run("systemctl", &["is-active", unit])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Whether the unit is masked. hostapd ships masked on Raspberry Pi
    /// OS images, so this is checked before every enable.
    pub fn is_masked(&self, unit: &str) -> bool {
        self.runner
            .run("systemctl", &["is-enabled", unit])
            .map(|o| o.stdout.trim() == "masked")
            .unwrap_or(false)
    }

    pub fn unmask(&self, unit: &str) -> Result<()> {
        debug!("unmasking {unit}");
        self.runner.run_ok("systemctl", &["unmask", unit])?;
        Ok(())
    }

    /// Enable the unit for activation on boot.
    pub fn enable(&self, unit: &str) -> Result<()> {
        self.runner.run_ok("systemctl", &["enable", unit])?;
        Ok(())
    }

    pub fn start(&self, unit: &str) -> Result<()> {
        self.runner.run_ok("systemctl", &["start", unit])?;
        Ok(())
    }

    pub fn restart(&self, unit: &str) -> Result<()> {
        self.runner.run_ok("systemctl", &["restart", unit])?;
        Ok(())
    }

    /// Stop a unit, ignoring failure (the unit may not exist at all).
    pub fn stop_quietly(&self, unit: &str) {
        match self.runner.run("systemctl", &["stop", unit]) {
            Ok(output) if output.success => debug!("stopped {unit}"),
            Ok(output) => debug!("stop {unit}: {}", output.combined()),
            Err(e) => debug!("stop {unit}: {e}"),
        }
    }

    /// `systemctl status` text regardless of exit code; status exits
    /// nonzero for inactive units but still prints what we want.
    pub fn status_text(&self, unit: &str) -> String {
        self.runner
            .run("systemctl", &["status", unit, "--no-pager", "-l"])
            .map(|o| o.combined())
            .unwrap_or_default()
    }

    /// Recent journal entries for the unit.
    pub fn journal_tail(&self, unit: &str) -> String {
        self.runner
            .run(
                "journalctl",
                &["-u", unit, "-n", JOURNAL_TAIL_LINES, "--no-pager"],
            )
            .map(|o| o.combined())
            .unwrap_or_default()
    }

    /// Status plus journal tail, captured when a unit fails to come up.
    pub fn diagnostics(&self, unit: &str) -> String {
        let status = self.status_text(unit);
        let journal = self.journal_tail(unit);
        let mut text = String::new();
        if !status.is_empty() {
            text.push_str(&status);
        }
        if !journal.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("Recent journal entries:\n");
            text.push_str(&journal);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    #[test]
    fn test_is_active() {
        let runner = FakeRunner::new();
        runner.ok("systemctl is-active hostapd", "active\n");
        runner.fail("systemctl is-active dnsmasq", "inactive\n");

        let systemd = SystemdClient::new(&runner);
        assert!(systemd.is_active("hostapd"));
        assert!(!systemd.is_active("dnsmasq"));
    }

    #[test]
    fn test_is_masked() {
        let runner = FakeRunner::new();
        runner.fail("systemctl is-enabled hostapd", "");
        runner.push(
            "systemctl is-enabled hostapd",
            crate::runner::CommandOutput {
                success: false,
                stdout: "masked\n".to_string(),
                stderr: String::new(),
            },
        );
        let systemd = SystemdClient::new(&runner);
        assert!(!systemd.is_masked("hostapd"));
        assert!(systemd.is_masked("hostapd"));
    }

    #[test]
    fn test_start_failure_propagates() {
        let runner = FakeRunner::new();
        runner.fail(
            "systemctl start hostapd",
            "Job for hostapd.service failed because the control process exited with error code.",
        );
        let systemd = SystemdClient::new(&runner);
        assert!(systemd.start("hostapd").is_err());
    }

    #[test]
    fn test_diagnostics_combines_status_and_journal() {
        let runner = FakeRunner::new();
        runner.fail(
            "systemctl status hostapd --no-pager -l",
            "hostapd.service: Failed with result 'exit-code'.",
        );
        runner.ok(
            "journalctl -u hostapd -n 25 --no-pager",
            "hostapd[123]: Could not open /etc/hostapd/hostapd.conf\n",
        );

        let systemd = SystemdClient::new(&runner);
        let diag = systemd.diagnostics("hostapd");
        assert!(diag.contains("Failed with result"));
        assert!(diag.contains("Recent journal entries:"));
        assert!(diag.contains("Could not open"));
    }

    #[test]
    fn test_stop_quietly_never_errors() {
        let runner = FakeRunner::new();
        runner.fail("systemctl stop wpa_supplicant", "Unit not loaded.");
        let systemd = SystemdClient::new(&runner);
        systemd.stop_quietly("wpa_supplicant");
        assert!(runner.called("stop wpa_supplicant"));
    }
}
