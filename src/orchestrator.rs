// AP Provisioner - Provisioning Pipeline
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The provisioning pipeline.
//!
//! [`Orchestrator::provision`] runs a fixed sequence of stages: privilege
//! check, interface detection, package installation, backups, client
//! disconnect, the three config artifacts, NAT, service start, and
//! verification. Every stage outcome is recorded in a [`ProvisionReport`]
//! that is written to disk after each stage, so an interrupted or killed
//! run still leaves an accurate account of how far it got. The first
//! failed stage aborts the rest; remaining stages are recorded as skipped.
//!
//! Nothing here mutates the host directly; all side effects go through
//! the [`CommandRunner`] seam and the paths in
//! [`ProvisionerSettings`](crate::models::config::ProvisionerSettings).

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use nix::unistd::Uid;
use owo_colors::OwoColorize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backup::{self, BackupManager};
use crate::detect::InterfaceDetector;
use crate::lockfile;
use crate::models::config::{ApConfig, ProvisionerSettings};
use crate::models::error::{Error, Result};
use crate::models::report::{ProvisionReport, Stage, StageReport, StageStatus};
use crate::models::{AP_DAEMON, DHCP_DAEMON, REQUIRED_PACKAGES};
use crate::nat::{self, NatManager};
use crate::network_utils;
use crate::render::Renderer;
use crate::runner::CommandRunner;
use crate::services::packages::PackageManager;
use crate::services::systemd::SystemdClient;
use crate::services::ServiceController;
use crate::wireless::{self, ApSupport};

/// File name of the failure report inside the state directory.
pub const TROUBLESHOOT_FILE: &str = "troubleshoot.txt";

const SEPARATOR: &str = "────────────────────────────────────────";

/// Stages in execution order.
const PIPELINE: [Stage; 11] = [
    Stage::Privilege,
    Stage::Detect,
    Stage::Packages,
    Stage::Backup,
    Stage::Disconnect,
    Stage::HostapdConfig,
    Stage::DnsmasqConfig,
    Stage::DhcpcdConfig,
    Stage::Nat,
    Stage::ServiceStart,
    Stage::Verify,
];

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Refuse to run without effective root. Tests disable this.
    pub require_root: bool,
    /// Restore the backups taken this run if provisioning fails.
    pub rollback_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            require_root: true,
            rollback_on_failure: false,
        }
    }
}

/// What one stage accomplished.
struct Outcome {
    message: String,
    warnings: Vec<String>,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    fn with_warnings(message: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            message: message.into(),
            warnings,
        }
    }
}

/// Sequences the provisioning stages and owns the overall outcome.
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a ProvisionerSettings,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        settings: &'a ProvisionerSettings,
        options: RunOptions,
    ) -> Self {
        Self {
            runner,
            settings,
            options,
        }
    }

    /// Run the full pipeline.
    ///
    /// Stage failures are reported in-band through the returned report;
    /// an `Err` here means the run could not begin at all (another run
    /// holds the lock).
    pub fn provision(&self, mut config: ApConfig) -> Result<ProvisionReport> {
        let paths = &self.settings.paths;
        let _lock = lockfile::acquire(&paths.lock_file)?;

        let mut report = ProvisionReport::new(config.ssid(), config.ap_ip().to_string());
        report.interface = config.interface().map(str::to_string);
        let mut controller = ServiceController::new(self.runner, self.settings);

        println!();
        println!(
            "{}",
            format!("Provisioning access point \"{}\"", config.ssid()).bold()
        );
        println!("{}", SEPARATOR.dimmed());

        let mut aborted = false;
        for stage in PIPELINE {
            if aborted {
                report.record(StageReport::skipped(stage, "not reached"));
                continue;
            }

            debug!("stage {} starting", stage.as_str());
            let started = Instant::now();
            let stage_report = match self.execute(stage, report.run_id, &mut config, &mut controller)
            {
                Ok(outcome) => {
                    if outcome.warnings.is_empty() {
                        StageReport::success(stage, outcome.message)
                    } else {
                        StageReport::warning(stage, outcome.message)
                            .with_detail(outcome.warnings.join("\n"))
                    }
                }
                Err(e) => {
                    aborted = true;
                    let mut failed = StageReport::error(stage, e.to_string());
                    if let Some(diagnostics) = e.diagnostics() {
                        failed = failed.with_detail(diagnostics.to_string());
                    }
                    failed
                }
            }
            .with_duration(started.elapsed());

            print_stage_line(&stage_report);
            report.record(stage_report);

            if report.interface.is_none() {
                report.interface = config.interface().map(str::to_string);
            }
            // Write-through so an interrupted run still leaves a record
            if let Err(e) = report.save(&paths.state_dir) {
                warn!("could not persist run report: {e}");
            }
        }

        report.finalize();
        self.print_result(&mut report, &config);

        if let Err(e) = report.save(&paths.state_dir) {
            warn!("could not persist run report: {e}");
        }
        Ok(report)
    }

    /// Render every artifact to stdout without touching the host.
    pub fn dry_run(&self, mut config: ApConfig) -> Result<()> {
        if config.interface().is_none() {
            let detector = InterfaceDetector::new(self.runner, &self.settings.paths.sysfs_net);
            let detection = detector.detect()?;
            config.set_interface(detection.interface);
        }
        let renderer = Renderer::new(&config, self.settings)?;
        println!("{}", renderer.render_all());
        Ok(())
    }

    /// Restore the configuration files saved by the most recent run.
    pub fn rollback(&self) -> Result<()> {
        let restored = backup::restore_latest(&self.settings.paths.state_dir)?;
        println!();
        for path in &restored {
            println!("  {} {}", "✔".green(), path.display());
        }
        println!();
        println!("Restored {} file(s). Restart the services to pick them up:", restored.len());
        println!("  systemctl restart {AP_DAEMON} {DHCP_DAEMON}");
        Ok(())
    }

    /// Show the last run's outcome and the current host state.
    pub fn status(&self) -> Result<()> {
        let paths = &self.settings.paths;
        let mut interface = None;
        println!();
        match ProvisionReport::load_last(&paths.state_dir)? {
            Some(report) => {
                println!("{}", format!("Last run {}", report.run_id).bold());
                println!("  started:   {}", report.started_at);
                if let Some(finished) = report.finished_at {
                    println!("  finished:  {finished}");
                }
                println!("  ssid:      {}", report.ssid);
                if let Some(name) = &report.interface {
                    println!("  interface: {name}");
                    interface = Some(name.clone());
                }
                println!("  ap ip:     {}", report.ap_ip);
                if report.rolled_back {
                    println!("  {}", "backups were restored after this run failed".yellow());
                }
                println!();
                for stage in &report.stages {
                    print_stage_line(stage);
                }
            }
            None => println!("No provisioning run recorded yet."),
        }

        println!();
        println!("{}", "[services]".cyan());
        let systemd = SystemdClient::new(self.runner);
        for unit in [AP_DAEMON, DHCP_DAEMON] {
            let state = if systemd.is_active(unit) {
                "active".green().to_string()
            } else {
                "inactive".red().to_string()
            };
            println!("  {unit}: {state}");
        }

        println!("{}", "[forwarding]".cyan());
        match nat::forwarding_enabled(&paths.proc_forward) {
            Some(true) => println!("  ipv4 forwarding enabled"),
            Some(false) => println!("  {}", "ipv4 forwarding disabled".yellow()),
            None => println!("  ipv4 forwarding state unknown"),
        }

        println!("{}", "[network]".cyan());
        if let Some(name) = &interface {
            let addresses = network_utils::interface_ipv4_addresses(self.runner, name);
            if addresses.is_empty() {
                println!("  {name}: {}", "no IPv4 address".yellow());
            } else {
                let joined: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
                println!("  {name}: {}", joined.join(", "));
            }
            match wireless::interface_info(self.runner, name) {
                Ok(info) if info.is_ap_mode() => println!(
                    "  {name}: AP mode, ssid {}",
                    info.ssid.as_deref().unwrap_or("(none)")
                ),
                Ok(info) => println!(
                    "  {name}: mode {}",
                    info.iftype.as_deref().unwrap_or("unknown")
                ),
                Err(e) => println!("  {name}: {e}"),
            }
        }
        match network_utils::default_route_device(self.runner) {
            Some(device) => println!("  default route via {device}"),
            None => println!("  {}", "no default route".yellow()),
        }
        Ok(())
    }

    fn execute(
        &self,
        stage: Stage,
        run_id: Uuid,
        config: &mut ApConfig,
        controller: &mut ServiceController<'_>,
    ) -> Result<Outcome> {
        let paths = &self.settings.paths;
        match stage {
            Stage::Privilege => {
                if !self.options.require_root {
                    return Ok(Outcome::ok("privilege check disabled"));
                }
                if Uid::effective().is_root() {
                    Ok(Outcome::ok("running as root"))
                } else {
                    Err(Error::PrivilegeRequired(
                        "provisioning rewrites system configuration and firewall rules; re-run with sudo"
                            .to_string(),
                    ))
                }
            }

            Stage::Detect => {
                if let Some(requested) = config.interface() {
                    let info = wireless::interface_info(self.runner, requested)?;
                    let mut warnings = Vec::new();
                    match wireless::ap_mode_support(self.runner, &info) {
                        ApSupport::Supported => {}
                        ApSupport::Unsupported => {
                            return Err(Error::InterfaceUnusable(format!(
                                "{requested}: radio does not advertise AP mode"
                            )));
                        }
                        ApSupport::Unknown => warnings.push(format!(
                            "could not confirm {requested} supports AP mode; continuing anyway"
                        )),
                    }
                    let message = format!("using requested interface {requested}");
                    return Ok(Outcome::with_warnings(message, warnings));
                }

                let detector = InterfaceDetector::new(self.runner, &paths.sysfs_net);
                let detection = detector.detect()?;
                let message = format!("selected {}", detection.interface);
                config.set_interface(detection.interface);
                Ok(Outcome::with_warnings(message, detection.warnings))
            }

            Stage::Packages => {
                let manager = PackageManager::new(self.runner);
                let installed = manager.ensure_installed(REQUIRED_PACKAGES)?;
                if installed.is_empty() {
                    Ok(Outcome::ok("all required packages present"))
                } else {
                    Ok(Outcome::ok(format!("installed {}", installed.join(", "))))
                }
            }

            Stage::Backup => {
                let mut manager = BackupManager::new(&paths.state_dir, run_id);
                let mut warnings = Vec::new();
                let mut saved = 0usize;
                for path in [
                    &paths.hostapd_conf,
                    &paths.hostapd_defaults,
                    &paths.dnsmasq_conf,
                    &paths.dhcpcd_conf,
                    &paths.iptables_rules,
                ] {
                    match manager.snapshot(path) {
                        Ok(Some(_)) => saved += 1,
                        Ok(None) => {}
                        Err(e) => {
                            warnings.push(format!("could not back up {}: {e}", path.display()))
                        }
                    }
                }
                let message = if saved == 0 {
                    "nothing to back up".to_string()
                } else {
                    format!("backed up {saved} file(s)")
                };
                Ok(Outcome::with_warnings(message, warnings))
            }

            Stage::Disconnect => {
                let interface = required_interface(config)?;
                let systemd = SystemdClient::new(self.runner);
                let mut warnings = Vec::new();
                // A client-mode supplicant would fight hostapd for the radio
                systemd.stop_quietly("wpa_supplicant");
                if self.runner.has_command("nmcli") {
                    match self
                        .runner
                        .run("nmcli", &["device", "set", &interface, "managed", "no"])
                    {
                        Ok(output) if output.success => {}
                        Ok(output) => warnings.push(format!(
                            "nmcli would not release {interface}: {}",
                            output.combined()
                        )),
                        Err(e) => {
                            warnings.push(format!("nmcli would not release {interface}: {e}"))
                        }
                    }
                }
                Ok(Outcome::with_warnings(
                    format!("released {interface} from client management"),
                    warnings,
                ))
            }

            Stage::HostapdConfig => {
                let renderer = Renderer::new(config, self.settings)?;
                let conf = renderer.write_hostapd()?;
                renderer.write_hostapd_defaults()?;
                Ok(Outcome::ok(format!("wrote {}", conf.display())))
            }

            Stage::DnsmasqConfig => {
                let renderer = Renderer::new(config, self.settings)?;
                let conf = renderer.write_dnsmasq()?;
                Ok(Outcome::ok(format!("wrote {}", conf.display())))
            }

            Stage::DhcpcdConfig => {
                let renderer = Renderer::new(config, self.settings)?;
                let conf = renderer.write_dhcpcd()?;
                Ok(Outcome::ok(format!(
                    "updated managed block in {}",
                    conf.display()
                )))
            }

            Stage::Nat => {
                let interface = required_interface(config)?;
                let manager = NatManager::new(self.runner, self.settings);
                let summary = manager.enable_forwarding(&interface)?;
                let mut warnings = Vec::new();
                if !summary.upstream_from_route {
                    warnings.push(format!(
                        "no default route; assuming {} is the uplink",
                        summary.upstream
                    ));
                }
                if !summary.persisted {
                    warnings.push(
                        "firewall rules are active but will not survive a reboot".to_string(),
                    );
                }
                Ok(Outcome::with_warnings(
                    format!("NAT enabled via {}", summary.upstream),
                    warnings,
                ))
            }

            Stage::ServiceStart => {
                let systemd = SystemdClient::new(self.runner);
                let mut warnings = Vec::new();
                // Pick up the static address before hostapd binds the interface
                if let Err(e) = systemd.restart("dhcpcd") {
                    warnings.push(format!("could not restart dhcpcd: {e}"));
                }
                controller.mark_configured(AP_DAEMON);
                controller.mark_configured(DHCP_DAEMON);
                controller.start(AP_DAEMON)?;
                controller.start(DHCP_DAEMON)?;
                Ok(Outcome::with_warnings(
                    format!("{AP_DAEMON} and {DHCP_DAEMON} running"),
                    warnings,
                ))
            }

            Stage::Verify => {
                let interface = required_interface(config)?;
                let warnings = controller.verify(&interface, config.ap_ip(), config.ssid())?;
                Ok(Outcome::with_warnings(
                    format!("access point \"{}\" verified on {interface}", config.ssid()),
                    warnings,
                ))
            }
        }
    }

    fn print_result(&self, report: &mut ProvisionReport, config: &ApConfig) {
        let paths = &self.settings.paths;
        println!();
        println!("{}", SEPARATOR.dimmed());
        match report.status {
            StageStatus::Error => {
                let failed = report
                    .stages
                    .iter()
                    .find(|s| s.failed())
                    .map(|s| s.stage.display_name())
                    .unwrap_or("pipeline");
                println!(
                    "{}",
                    format!("✖ Provisioning failed during {failed}").red().bold()
                );
                match self.write_troubleshooting(report) {
                    Ok(path) => println!("  troubleshooting report: {}", path.display()),
                    Err(e) => warn!("could not write troubleshooting report: {e}"),
                }
                if self.options.rollback_on_failure {
                    match backup::restore_latest(&paths.state_dir) {
                        Ok(restored) => {
                            report.rolled_back = true;
                            println!("  restored {} backed-up file(s)", restored.len());
                        }
                        Err(Error::NoBackupsFound) => {
                            println!("  no backups to restore");
                        }
                        Err(e) => warn!("rollback failed: {e}"),
                    }
                }
            }
            StageStatus::Warning => {
                println!(
                    "{}",
                    format!(
                        "⚠ Access point \"{}\" is up at {} (with warnings, see above)",
                        report.ssid, report.ap_ip
                    )
                    .yellow()
                    .bold()
                );
            }
            _ => {
                println!(
                    "{}",
                    format!("✔ Access point \"{}\" is up at {}", report.ssid, report.ap_ip)
                        .green()
                        .bold()
                );
                println!(
                    "  clients receive addresses {} - {}",
                    config.dhcp_start(),
                    config.dhcp_end()
                );
            }
        }
    }

    /// Capture everything an operator needs to debug a failed run.
    fn write_troubleshooting(&self, report: &ProvisionReport) -> Result<PathBuf> {
        let paths = &self.settings.paths;
        let systemd = SystemdClient::new(self.runner);
        let mut text = String::new();

        let _ = writeln!(text, "ap-provisioner troubleshooting report");
        let _ = writeln!(
            text,
            "run {} started {}",
            report.run_id,
            report.started_at.to_rfc3339()
        );
        let _ = writeln!(text);

        for stage in report.stages.iter().filter(|s| s.failed()) {
            let _ = writeln!(text, "failed stage: {}", stage.stage.display_name());
            let _ = writeln!(text, "  {}", stage.message);
            if let Some(detail) = &stage.detail {
                for line in detail.lines() {
                    let _ = writeln!(text, "  {line}");
                }
            }
            let _ = writeln!(text);
        }

        let _ = writeln!(text, "[services]");
        for unit in [AP_DAEMON, DHCP_DAEMON] {
            let _ = writeln!(text, "--- {unit} ---");
            let diagnostics = systemd.diagnostics(unit);
            if diagnostics.is_empty() {
                let _ = writeln!(text, "(no output)");
            } else {
                let _ = writeln!(text, "{diagnostics}");
            }
        }
        let _ = writeln!(text);

        let _ = writeln!(text, "[firewall]");
        match self.runner.run("iptables", &["-t", "nat", "-L", "-v"]) {
            Ok(output) => {
                let _ = writeln!(text, "{}", output.combined());
            }
            Err(e) => {
                let _ = writeln!(text, "iptables unavailable: {e}");
            }
        }
        let _ = writeln!(text);

        let _ = writeln!(text, "[forwarding]");
        match nat::forwarding_enabled(&paths.proc_forward) {
            Some(true) => {
                let _ = writeln!(text, "ipv4 forwarding enabled");
            }
            Some(false) => {
                let _ = writeln!(text, "ipv4 forwarding DISABLED");
            }
            None => {
                let _ = writeln!(text, "forwarding flag unreadable");
            }
        }
        let _ = writeln!(text);

        let _ = writeln!(text, "[routing]");
        match self.runner.run("ip", &["route", "show", "default"]) {
            Ok(output) if !output.stdout.trim().is_empty() => {
                let _ = writeln!(text, "{}", output.stdout.trim_end());
            }
            _ => {
                let _ = writeln!(text, "no default route");
            }
        }
        let _ = writeln!(text);

        let _ = writeln!(text, "next steps:");
        let _ = writeln!(text, "  journalctl -u {AP_DAEMON} -b");
        let _ = writeln!(text, "  iw phy  (check 'Supported interface modes' for AP)");
        let _ = writeln!(text, "  re-run with --debug for command-level logging");

        fs::create_dir_all(&paths.state_dir)?;
        let path = paths.state_dir.join(TROUBLESHOOT_FILE);
        fs::write(&path, text).map_err(|e| Error::write_failed(&path, e.to_string()))?;
        Ok(path)
    }
}

fn required_interface(config: &ApConfig) -> Result<String> {
    config
        .interface()
        .map(str::to_string)
        .ok_or_else(|| Error::ValidationFailed("no interface selected".to_string()))
}

fn print_stage_line(stage_report: &StageReport) {
    let line = format!(
        "{} {}: {}",
        stage_report.status.glyph(),
        stage_report.stage.display_name(),
        stage_report.message
    );
    match stage_report.status {
        StageStatus::Success => println!("  {}", line.green()),
        StageStatus::Warning => println!("  {}", line.yellow()),
        StageStatus::Error => println!("  {}", line.red()),
        StageStatus::Skipped => println!("  {}", line.dimmed()),
        StageStatus::Running => println!("  {line}"),
    }
    if stage_report.status == StageStatus::Warning {
        if let Some(detail) = &stage_report.detail {
            for warning in detail.lines() {
                println!("      {}", warning.dimmed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{ApConfigInput, Paths};
    use crate::render::BLOCK_BEGIN;
    use crate::runner::fake::FakeRunner;
    use tempfile::TempDir;

    const DEV_INFO_MANAGED: &str = "Interface wlan0\n\ttype managed\n\twiphy 0\n";
    const DEV_INFO_AP: &str =
        "Interface wlan0\n\tssid RadxaAP\n\ttype AP\n\twiphy 0\n\tchannel 7 (2442 MHz)\n";
    const PHY_INFO_WITH_AP: &str = concat!(
        "Wiphy phy0\n",
        "\tSupported interface modes:\n",
        "\t\t * managed\n",
        "\t\t * AP\n",
        "\tBand 1:\n",
    );

    struct TestHost {
        _dir: TempDir,
        settings: ProvisionerSettings,
    }

    fn test_host(wireless: &[&str]) -> TestHost {
        let dir = TempDir::new().unwrap();
        let settings = ProvisionerSettings {
            settle_timeout_secs: 1,
            poll_interval_ms: 1,
            paths: Paths::under(dir.path()),
            ..ProvisionerSettings::default()
        };
        for name in wireless {
            fs::create_dir_all(settings.paths.sysfs_net.join(name).join("wireless")).unwrap();
        }
        // The live toggle sits under /proc on a real host
        fs::create_dir_all(settings.paths.proc_forward.parent().unwrap()).unwrap();
        fs::write(&settings.paths.proc_forward, "0").unwrap();
        TestHost {
            _dir: dir,
            settings,
        }
    }

    fn test_config() -> ApConfig {
        ApConfigInput {
            ssid: "RadxaAP".to_string(),
            passphrase: "radxa123456".to_string(),
            ap_ip: "192.168.4.1".to_string(),
            dhcp_start: "192.168.4.2".to_string(),
            dhcp_end: "192.168.4.20".to_string(),
            channel: 7,
            country_code: "PK".to_string(),
            interface: None,
        }
        .validate()
        .unwrap()
    }

    fn test_options() -> RunOptions {
        RunOptions {
            require_root: false,
            rollback_on_failure: false,
        }
    }

    /// Script everything a clean successful run needs.
    fn happy_runner() -> FakeRunner {
        let runner = FakeRunner::new();
        // Detection sees a managed interface; verification sees it in AP mode
        runner.ok("iw dev wlan0 info", DEV_INFO_MANAGED);
        runner.ok("iw dev wlan0 info", DEV_INFO_AP);
        runner.ok("iw phy phy0 info", PHY_INFO_WITH_AP);
        for package in ["hostapd", "dnsmasq", "iptables"] {
            runner.ok(
                &format!("dpkg-query -W -f=${{Status}} {package}"),
                "install ok installed\n",
            );
        }
        runner.ok(
            "ip route show default",
            "default via 10.0.0.1 dev eth0 proto dhcp metric 100\n",
        );
        runner.ok(
            "ip -4 addr show dev wlan0",
            "    inet 192.168.4.1/24 brd 192.168.4.255 scope global wlan0\n",
        );
        runner
    }

    #[test]
    fn test_full_pipeline_success() {
        let host = test_host(&["wlan0"]);
        let runner = happy_runner();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());

        let report = orchestrator.provision(test_config()).unwrap();

        assert_eq!(report.status, StageStatus::Success);
        assert_eq!(report.interface.as_deref(), Some("wlan0"));
        assert_eq!(report.stages.len(), PIPELINE.len());
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Success));

        // All four artifacts landed
        let paths = &host.settings.paths;
        let hostapd = fs::read_to_string(&paths.hostapd_conf).unwrap();
        assert!(hostapd.contains("ssid=RadxaAP"));
        assert!(hostapd.contains("interface=wlan0"));
        let dnsmasq = fs::read_to_string(&paths.dnsmasq_conf).unwrap();
        assert!(dnsmasq.contains("dhcp-range=192.168.4.2,192.168.4.20,255.255.255.0,24h"));
        let dhcpcd = fs::read_to_string(&paths.dhcpcd_conf).unwrap();
        assert!(dhcpcd.contains(BLOCK_BEGIN));
        let defaults = fs::read_to_string(&paths.hostapd_defaults).unwrap();
        assert!(defaults.contains("DAEMON_CONF"));

        // Forwarding flipped live and persistently
        assert_eq!(fs::read_to_string(&paths.proc_forward).unwrap(), "1");
        assert_eq!(
            fs::read_to_string(&paths.sysctl_dropin).unwrap(),
            "net.ipv4.ip_forward=1\n"
        );

        // hostapd starts strictly before dnsmasq
        let calls = runner.calls();
        let ap_start = calls
            .iter()
            .position(|c| c == "systemctl start hostapd")
            .unwrap();
        let dhcp_start = calls
            .iter()
            .position(|c| c == "systemctl start dnsmasq")
            .unwrap();
        assert!(ap_start < dhcp_start);

        // Report persisted and lock released
        assert!(paths.state_dir.join("last-run.json").exists());
        assert!(!paths.lock_file.exists());
    }

    #[test]
    fn test_hostapd_start_failure_aborts_pipeline() {
        let host = test_host(&["wlan0"]);
        let runner = happy_runner();
        runner.fail(
            "systemctl start hostapd",
            "Job for hostapd.service failed because the control process exited with error code.",
        );
        runner.ok(
            "journalctl -u hostapd -n 25 --no-pager",
            "hostapd[620]: nl80211: Could not configure driver mode\n",
        );

        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());
        let report = orchestrator.provision(test_config()).unwrap();

        assert_eq!(report.status, StageStatus::Error);
        let failed = report
            .stages
            .iter()
            .find(|s| s.stage == Stage::ServiceStart)
            .unwrap();
        assert_eq!(failed.status, StageStatus::Error);
        assert!(failed.detail.as_deref().unwrap().contains("nl80211"));

        // dnsmasq was never started; verification never ran
        assert!(!runner.called("systemctl start dnsmasq"));
        let verify = report
            .stages
            .iter()
            .find(|s| s.stage == Stage::Verify)
            .unwrap();
        assert_eq!(verify.status, StageStatus::Skipped);

        // Troubleshooting report carries the captured diagnostics
        let troubleshoot = host.settings.paths.state_dir.join(TROUBLESHOOT_FILE);
        let text = fs::read_to_string(troubleshoot).unwrap();
        assert!(text.contains("Service Start"));
        assert!(text.contains("nl80211"));
        assert!(text.contains("journalctl -u hostapd"));
    }

    #[test]
    fn test_rollback_on_failure_restores_originals() {
        let host = test_host(&["wlan0"]);
        let paths = &host.settings.paths;
        fs::create_dir_all(paths.hostapd_conf.parent().unwrap()).unwrap();
        fs::write(&paths.hostapd_conf, "# operator's original config\n").unwrap();

        let runner = happy_runner();
        runner.fail("systemctl start hostapd", "start request failed");

        let options = RunOptions {
            require_root: false,
            rollback_on_failure: true,
        };
        let orchestrator = Orchestrator::new(&runner, &host.settings, options);
        let report = orchestrator.provision(test_config()).unwrap();

        assert_eq!(report.status, StageStatus::Error);
        assert!(report.rolled_back);
        assert_eq!(
            fs::read_to_string(&paths.hostapd_conf).unwrap(),
            "# operator's original config\n"
        );
    }

    #[test]
    fn test_no_interface_skips_all_mutation() {
        let host = test_host(&[]);
        let runner = FakeRunner::new();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());

        let report = orchestrator.provision(test_config()).unwrap();

        assert_eq!(report.status, StageStatus::Error);
        let detect = report
            .stages
            .iter()
            .find(|s| s.stage == Stage::Detect)
            .unwrap();
        assert_eq!(detect.status, StageStatus::Error);
        // Everything downstream is skipped, nothing touched the host
        assert!(report
            .stages
            .iter()
            .skip_while(|s| s.stage != Stage::Packages)
            .all(|s| s.status == StageStatus::Skipped));
        assert!(!host.settings.paths.hostapd_conf.exists());
        assert!(!runner.called("systemctl start"));
        assert!(!runner.called("MASQUERADE"));
    }

    #[test]
    fn test_missing_persistence_tool_is_warning() {
        let host = test_host(&["wlan0"]);
        let runner = happy_runner()
            .without_command("netfilter-persistent")
            .without_command("iptables-save");
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());

        let report = orchestrator.provision(test_config()).unwrap();

        assert_eq!(report.status, StageStatus::Warning);
        let nat = report
            .stages
            .iter()
            .find(|s| s.stage == Stage::Nat)
            .unwrap();
        assert_eq!(nat.status, StageStatus::Warning);
        assert!(nat.detail.as_deref().unwrap().contains("reboot"));
    }

    #[test]
    fn test_concurrent_run_is_refused() {
        let host = test_host(&["wlan0"]);
        let paths = &host.settings.paths;
        fs::create_dir_all(paths.lock_file.parent().unwrap()).unwrap();
        fs::write(&paths.lock_file, format!("{}\n", std::process::id())).unwrap();

        let runner = happy_runner();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());
        let err = orchestrator.provision(test_config()).unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning { .. }));
        // Nothing ran
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let host = test_host(&[]);
        let runner = FakeRunner::new();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());

        let mut config = test_config();
        config.set_interface("wlan7");
        orchestrator.dry_run(config).unwrap();

        assert!(runner.calls().is_empty());
        assert!(!host.settings.paths.hostapd_conf.exists());
        assert!(!host.settings.paths.state_dir.exists());
    }

    #[test]
    fn test_status_reports_after_a_run() {
        let host = test_host(&["wlan0"]);
        let runner = happy_runner();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());
        orchestrator.provision(test_config()).unwrap();

        orchestrator.status().unwrap();
        assert!(runner.called("systemctl is-active hostapd"));
        assert!(runner.called("ip route show default"));
    }

    #[test]
    fn test_rollback_without_backups_errors() {
        let host = test_host(&[]);
        let runner = FakeRunner::new();
        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());
        assert!(matches!(
            orchestrator.rollback().unwrap_err(),
            Error::NoBackupsFound
        ));
    }

    #[test]
    fn test_requested_interface_skips_detection() {
        let host = test_host(&["wlan0", "wlan1"]);
        let runner = happy_runner();
        // The requested interface, not the lexicographic winner
        runner.ok("iw dev wlan1 info", "Interface wlan1\n\ttype managed\n\twiphy 1\n");
        runner.ok("iw phy phy1 info", PHY_INFO_WITH_AP);
        runner.ok(
            "ip -4 addr show dev wlan1",
            "    inet 192.168.4.1/24 scope global wlan1\n",
        );
        runner.ok("iw dev wlan1 info", DEV_INFO_AP);

        let orchestrator = Orchestrator::new(&runner, &host.settings, test_options());
        let mut config = test_config();
        config.set_interface("wlan1");
        let report = orchestrator.provision(config).unwrap();

        assert_eq!(report.interface.as_deref(), Some("wlan1"));
        assert!(!runner.called("iw dev wlan0 info"));
        let hostapd = fs::read_to_string(&host.settings.paths.hostapd_conf).unwrap();
        assert!(hostapd.contains("interface=wlan1"));
    }
}
