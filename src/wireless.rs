// AP Provisioner - Wireless Radio Queries
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Wrappers around iw(8) for radio state and capability queries.
//!
//! `iw dev <if> info` tells us whether an interface is queryable at all
//! and what mode it currently runs in; `iw phy <phy> info` lists the
//! interface modes the physical radio advertises. Both outputs are
//! line-oriented and parsed here into plain structs so the detector and
//! verifier never see raw command output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::error::{Error, Result};
use crate::runner::CommandRunner;

static IW_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*type\s+(\S+)").unwrap());
static IW_SSID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*ssid\s+(.+)$").unwrap());
static IW_WIPHY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*wiphy\s+(\d+)").unwrap());
static IW_CHANNEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*channel\s+(\d+)").unwrap());

/// Snapshot of `iw dev <if> info` for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    /// Current interface mode as iw reports it, e.g. `managed` or `AP`.
    pub iftype: Option<String>,
    /// SSID when the interface is associated or running an AP.
    pub ssid: Option<String>,
    /// Index of the physical radio backing this interface.
    pub wiphy: Option<u32>,
    pub channel: Option<u8>,
}

impl InterfaceInfo {
    /// Whether the radio currently runs in AP mode.
    pub fn is_ap_mode(&self) -> bool {
        self.iftype.as_deref() == Some("AP")
    }
}

/// What the physical radio says about AP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApSupport {
    Supported,
    Unsupported,
    /// The driver did not give a clear answer; treated as a warning,
    /// not a failure, since capability reporting is spotty.
    Unknown,
}

/// Query `iw dev <if> info`.
///
/// A failing query means the interface exists in sysfs but nl80211 cannot
/// talk to it, which makes it unusable as an AP.
pub fn interface_info(runner: &dyn CommandRunner, name: &str) -> Result<InterfaceInfo> {
    let output = runner
        .run("iw", &["dev", name, "info"])
        .map_err(|e| Error::InterfaceUnusable(format!("{name}: {e}")))?;
    if !output.success {
        return Err(Error::InterfaceUnusable(format!(
            "{name}: iw cannot query it: {}",
            output.combined()
        )));
    }
    Ok(parse_interface_info(name, &output.stdout))
}

/// Parse the output of `iw dev <if> info`.
pub fn parse_interface_info(name: &str, output: &str) -> InterfaceInfo {
    InterfaceInfo {
        name: name.to_string(),
        iftype: IW_TYPE.captures(output).map(|c| c[1].to_string()),
        ssid: IW_SSID
            .captures(output)
            .map(|c| c[1].trim_end().to_string()),
        wiphy: IW_WIPHY.captures(output).and_then(|c| c[1].parse().ok()),
        channel: IW_CHANNEL.captures(output).and_then(|c| c[1].parse().ok()),
    }
}

/// Ask the physical radio whether it advertises AP mode.
///
/// Never fails: any problem talking to the phy collapses to
/// [`ApSupport::Unknown`].
pub fn ap_mode_support(runner: &dyn CommandRunner, info: &InterfaceInfo) -> ApSupport {
    let Some(wiphy) = info.wiphy else {
        return ApSupport::Unknown;
    };
    let phy = format!("phy{wiphy}");
    let Ok(output) = runner.run("iw", &["phy", &phy, "info"]) else {
        return ApSupport::Unknown;
    };
    if !output.success {
        return ApSupport::Unknown;
    }
    match parse_supported_modes(&output.stdout) {
        Some(modes) if modes.iter().any(|m| m == "AP") => ApSupport::Supported,
        Some(_) => ApSupport::Unsupported,
        None => ApSupport::Unknown,
    }
}

/// Extract the "Supported interface modes" list from `iw phy` output.
///
/// Returns `None` when the section is absent entirely.
pub fn parse_supported_modes(output: &str) -> Option<Vec<String>> {
    let mut modes = Vec::new();
    let mut in_section = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Supported interface modes") {
            in_section = true;
            continue;
        }
        if in_section {
            if let Some(mode) = trimmed.strip_prefix("* ") {
                modes.push(mode.trim().to_string());
            } else {
                // First non-bullet line ends the section
                break;
            }
        }
    }

    if in_section {
        Some(modes)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    const DEV_INFO_AP: &str = concat!(
        "Interface wlan0\n",
        "\tifindex 3\n",
        "\twdev 0x1\n",
        "\taddr b8:27:eb:aa:bb:cc\n",
        "\tssid RadxaAP\n",
        "\ttype AP\n",
        "\twiphy 0\n",
        "\tchannel 7 (2442 MHz), width: 20 MHz, center1: 2442 MHz\n",
        "\ttxpower 31.00 dBm\n",
    );

    const DEV_INFO_MANAGED: &str = concat!(
        "Interface wlP2p33s0\n",
        "\tifindex 4\n",
        "\twdev 0x100000001\n",
        "\taddr dc:a6:32:00:11:22\n",
        "\ttype managed\n",
        "\twiphy 1\n",
    );

    const PHY_INFO_WITH_AP: &str = concat!(
        "Wiphy phy0\n",
        "\tmax # scan SSIDs: 10\n",
        "\tSupported interface modes:\n",
        "\t\t * IBSS\n",
        "\t\t * managed\n",
        "\t\t * AP\n",
        "\t\t * AP/VLAN\n",
        "\t\t * monitor\n",
        "\t\t * P2P-client\n",
        "\t\t * P2P-GO\n",
        "\tBand 1:\n",
        "\t\tCapabilities: 0x1062\n",
    );

    const PHY_INFO_NO_AP: &str = concat!(
        "Wiphy phy1\n",
        "\tSupported interface modes:\n",
        "\t\t * managed\n",
        "\t\t * monitor\n",
        "\tBand 1:\n",
    );

    #[test]
    fn test_parse_ap_interface() {
        let info = parse_interface_info("wlan0", DEV_INFO_AP);
        assert_eq!(info.iftype.as_deref(), Some("AP"));
        assert_eq!(info.ssid.as_deref(), Some("RadxaAP"));
        assert_eq!(info.wiphy, Some(0));
        assert_eq!(info.channel, Some(7));
        assert!(info.is_ap_mode());
    }

    #[test]
    fn test_parse_managed_interface() {
        let info = parse_interface_info("wlP2p33s0", DEV_INFO_MANAGED);
        assert_eq!(info.iftype.as_deref(), Some("managed"));
        assert!(info.ssid.is_none());
        assert_eq!(info.wiphy, Some(1));
        assert!(!info.is_ap_mode());
    }

    #[test]
    fn test_interface_info_unusable() {
        let runner = FakeRunner::new();
        runner.fail("iw dev wlan9 info", "command failed: No such device (-19)");
        let err = interface_info(&runner, "wlan9").unwrap_err();
        assert!(matches!(err, Error::InterfaceUnusable(_)));
        assert!(err.to_string().contains("wlan9"));
    }

    #[test]
    fn test_parse_supported_modes() {
        let modes = parse_supported_modes(PHY_INFO_WITH_AP).unwrap();
        assert!(modes.iter().any(|m| m == "AP"));
        assert!(modes.iter().any(|m| m == "managed"));
        // Section ends at "Band 1:", nothing from outside leaks in
        assert!(!modes.iter().any(|m| m.contains("Band")));

        assert!(parse_supported_modes("Wiphy phy0\n\tBand 1:\n").is_none());
    }

    #[test]
    fn test_ap_mode_support_supported() {
        let runner = FakeRunner::new();
        runner.ok("iw phy phy0 info", PHY_INFO_WITH_AP);
        let info = parse_interface_info("wlan0", DEV_INFO_AP);
        assert_eq!(ap_mode_support(&runner, &info), ApSupport::Supported);
    }

    #[test]
    fn test_ap_mode_support_unsupported() {
        let runner = FakeRunner::new();
        runner.ok("iw phy phy1 info", PHY_INFO_NO_AP);
        let info = parse_interface_info("wlP2p33s0", DEV_INFO_MANAGED);
        assert_eq!(ap_mode_support(&runner, &info), ApSupport::Unsupported);
    }

    #[test]
    fn test_ap_mode_support_unknown() {
        // No wiphy index in the info output
        let info = parse_interface_info("wlan0", "Interface wlan0\n\ttype managed\n");
        let runner = FakeRunner::new();
        assert_eq!(ap_mode_support(&runner, &info), ApSupport::Unknown);

        // Phy query fails
        let info = parse_interface_info("wlan0", DEV_INFO_AP);
        let failing = FakeRunner::new();
        failing.fail("iw phy phy0 info", "nl80211 not found");
        assert_eq!(ap_mode_support(&failing, &info), ApSupport::Unknown);

        // Phy answers but without a modes section
        let vague = FakeRunner::new();
        vague.ok("iw phy phy0 info", "Wiphy phy0\n\tBand 1:\n");
        assert_eq!(ap_mode_support(&vague, &info), ApSupport::Unknown);
    }
}
