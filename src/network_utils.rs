// AP Provisioner - Network Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Host network queries.
//!
//! Interface enumeration reads the Linux sysfs tree; routing and address
//! queries shell out to iproute2 through a [`CommandRunner`].

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::runner::CommandRunner;

static DEFAULT_ROUTE_DEV: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdev\s+(\S+)").unwrap());
static INET_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\binet\s+(\d+\.\d+\.\d+\.\d+)/\d+").unwrap());

/// List wireless interfaces under the sysfs net directory.
///
/// Classification is marker based: a `wireless` or `phy80211` entry, or
/// `DEVTYPE=wlan` in uevent. Names come back sorted so repeated runs on
/// the same hardware always pick the same interface.
pub fn list_wireless_interfaces(sysfs_net: &Path) -> Vec<String> {
    let mut interfaces = Vec::new();

    if let Ok(entries) = fs::read_dir(sysfs_net) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip loopback
            if name == "lo" {
                continue;
            }

            if is_wireless(&entry.path()) {
                interfaces.push(name);
            }
        }
    }

    interfaces.sort();
    interfaces
}

/// Check the sysfs markers that identify an 802.11 device.
fn is_wireless(path: &Path) -> bool {
    if path.join("wireless").exists() {
        return true;
    }
    if path.join("phy80211").exists() {
        return true;
    }

    // Fall back to uevent for drivers that expose neither directory
    let uevent_path = path.join("uevent");
    if let Ok(uevent) = fs::read_to_string(&uevent_path) {
        if uevent.lines().any(|line| line.trim() == "DEVTYPE=wlan") {
            return true;
        }
    }

    false
}

/// Read an interface's operational state (up/down/dormant).
pub fn operstate(sysfs_net: &Path, name: &str) -> Option<String> {
    fs::read_to_string(sysfs_net.join(name).join("operstate"))
        .ok()
        .map(|s| s.trim().to_string())
}

/// Device carrying the default route, if one exists.
pub fn default_route_device(runner: &dyn CommandRunner) -> Option<String> {
    let output = runner.run("ip", &["route", "show", "default"]).ok()?;
    if !output.success {
        return None;
    }
    DEFAULT_ROUTE_DEV
        .captures(&output.stdout)
        .map(|caps| caps[1].to_string())
}

/// IPv4 addresses currently assigned to an interface.
pub fn interface_ipv4_addresses(runner: &dyn CommandRunner, interface: &str) -> Vec<Ipv4Addr> {
    let Ok(output) = runner.run("ip", &["-4", "addr", "show", "dev", interface]) else {
        return Vec::new();
    };
    if !output.success {
        return Vec::new();
    }
    INET_ADDR
        .captures_iter(&output.stdout)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}
