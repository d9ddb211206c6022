// AP Provisioner - Command Line Interface
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Clap derive structures for the `ap-provisioner` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::config::{ApConfigInput, ProvisionerSettings};

/// ap-provisioner -- turn a board's WiFi radio into an access point
#[derive(Debug, Parser)]
#[command(
    name = "ap-provisioner",
    version,
    about = "Provision a WiFi access point with NAT to the wired uplink",
    long_about = "Configures hostapd, dnsmasq, and iptables so the board's wireless\n\
        interface serves a WPA2 access point and routes client traffic to the\n\
        internet. Existing configuration files are backed up before anything\n\
        is overwritten.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file to use instead of the default locations
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision the access point (default when no command is given)
    Provision(ProvisionArgs),

    /// Restore the configuration files saved by the most recent run
    Rollback,

    /// Show the outcome of the last run and current service state
    Status,
}

#[derive(Debug, Args, Default)]
pub struct ProvisionArgs {
    /// Network name to broadcast
    #[arg(long)]
    pub ssid: Option<String>,

    /// WPA2 passphrase (8-63 characters); prompted for when omitted
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Static address the AP interface takes, e.g. 192.168.4.1
    #[arg(long, value_name = "ADDR")]
    pub ap_ip: Option<String>,

    /// First DHCP lease address
    #[arg(long, value_name = "ADDR")]
    pub dhcp_start: Option<String>,

    /// Last DHCP lease address
    #[arg(long, value_name = "ADDR")]
    pub dhcp_end: Option<String>,

    /// 2.4 GHz channel (1-13)
    #[arg(long)]
    pub channel: Option<u8>,

    /// Two-letter regulatory country code
    #[arg(long, value_name = "CC")]
    pub country: Option<String>,

    /// Wireless interface to use instead of auto-detection
    #[arg(long, short = 'i', value_name = "IFACE")]
    pub interface: Option<String>,

    /// Render all configuration to stdout without touching the host
    #[arg(long)]
    pub dry_run: bool,

    /// Restore backups automatically if provisioning fails
    #[arg(long)]
    pub rollback_on_failure: bool,
}

impl ProvisionArgs {
    /// Build the raw input: settings defaults, overridden by flags.
    pub fn to_input(&self, settings: &ProvisionerSettings) -> ApConfigInput {
        let mut input = ApConfigInput::from_settings(settings);
        if let Some(ssid) = &self.ssid {
            input.ssid = ssid.clone();
        }
        if let Some(passphrase) = &self.passphrase {
            input.passphrase = passphrase.clone();
        }
        if let Some(ap_ip) = &self.ap_ip {
            input.ap_ip = ap_ip.clone();
        }
        if let Some(dhcp_start) = &self.dhcp_start {
            input.dhcp_start = dhcp_start.clone();
        }
        if let Some(dhcp_end) = &self.dhcp_end {
            input.dhcp_end = dhcp_end.clone();
        }
        if let Some(channel) = self.channel {
            input.channel = channel;
        }
        if let Some(country) = &self.country {
            input.country_code = country.clone();
        }
        input.interface = self.interface.clone();
        input
    }
}
