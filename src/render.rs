// AP Provisioner - Configuration Rendering
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Rendering of the daemon configuration artifacts.
//!
//! A [`Renderer`] turns one validated [`ApConfig`] plus the tool settings
//! into the four artifacts the host needs: hostapd.conf, dnsmasq.conf,
//! the dhcpcd static-IP block, and the hostapd defaults pointer. Rendering
//! is pure string work; the write helpers only touch the filesystem when
//! content actually changed, so re-provisioning with identical input is
//! byte-identical and leaves file timestamps alone.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::models::config::{ApConfig, ProvisionerSettings};
use crate::models::error::{Error, Result};

/// First line of the managed dhcpcd block.
pub const BLOCK_BEGIN: &str = "# BEGIN ap-provisioner managed block";
/// Last line of the managed dhcpcd block.
pub const BLOCK_END: &str = "# END ap-provisioner managed block";

const GENERATED_HEADER: &str = "# Generated by ap-provisioner; re-run the tool to change settings.";

/// Renders all configuration artifacts for one provisioning run.
pub struct Renderer<'a> {
    config: &'a ApConfig,
    settings: &'a ProvisionerSettings,
    interface: String,
}

impl<'a> Renderer<'a> {
    /// Build a renderer; the config must carry the detected interface.
    pub fn new(config: &'a ApConfig, settings: &'a ProvisionerSettings) -> Result<Self> {
        let interface = config
            .interface()
            .ok_or_else(|| {
                Error::ValidationFailed("no interface selected before rendering".to_string())
            })?
            .to_string();
        Ok(Self {
            config,
            settings,
            interface,
        })
    }

    /// hostapd configuration: WPA2-PSK on 2.4 GHz with 802.11n enabled.
    pub fn hostapd_conf(&self) -> String {
        let cfg = self.config;
        let mut out = String::new();
        let _ = writeln!(out, "{GENERATED_HEADER}");
        let _ = writeln!(out, "interface={}", self.interface);
        let _ = writeln!(out, "driver=nl80211");
        let _ = writeln!(out, "ssid={}", cfg.ssid());
        let _ = writeln!(out, "hw_mode=g");
        let _ = writeln!(out, "channel={}", cfg.channel());
        let _ = writeln!(out, "country_code={}", cfg.country_code());
        let _ = writeln!(out, "wmm_enabled=1");
        let _ = writeln!(out, "ieee80211n=1");
        let _ = writeln!(out, "ht_capab=[HT40][SHORT-GI-20][SHORT-GI-40]");
        let _ = writeln!(out, "macaddr_acl=0");
        let _ = writeln!(out, "auth_algs=1");
        let _ = writeln!(out, "wpa=2");
        let _ = writeln!(out, "wpa_passphrase={}", cfg.passphrase().reveal());
        let _ = writeln!(out, "wpa_key_mgmt=WPA-PSK");
        let _ = writeln!(out, "wpa_pairwise=TKIP CCMP");
        let _ = writeln!(out, "rsn_pairwise=CCMP");
        let _ = writeln!(out, "beacon_int=100");
        let _ = writeln!(out, "dtim_period=2");
        let _ = writeln!(out, "max_num_sta={}", self.settings.max_stations);
        out
    }

    /// dnsmasq configuration: DHCP on the AP interface plus caching DNS.
    pub fn dnsmasq_conf(&self) -> String {
        let cfg = self.config;
        let mut out = String::new();
        let _ = writeln!(out, "{GENERATED_HEADER}");
        let _ = writeln!(out, "interface={}", self.interface);
        let _ = writeln!(out, "bind-interfaces");
        let _ = writeln!(
            out,
            "dhcp-range={},{},255.255.255.0,{}",
            cfg.dhcp_start(),
            cfg.dhcp_end(),
            self.settings.lease_time
        );
        // Clients use the AP itself as gateway and resolver
        let _ = writeln!(out, "dhcp-option=3,{}", cfg.ap_ip());
        let _ = writeln!(out, "dhcp-option=6,{}", cfg.ap_ip());
        for server in &self.settings.dns_servers {
            let _ = writeln!(out, "server={server}");
        }
        let _ = writeln!(out, "domain-needed");
        let _ = writeln!(out, "bogus-priv");
        let _ = writeln!(out, "log-queries");
        let _ = writeln!(out, "log-dhcp");
        let _ = writeln!(out, "cache-size={}", self.settings.cache_size);
        out
    }

    /// Static-IP block appended to dhcpcd.conf.
    ///
    /// `nohook wpa_supplicant` keeps dhcpcd from spawning a client-mode
    /// supplicant on the interface hostapd owns.
    pub fn dhcpcd_block(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{BLOCK_BEGIN}");
        let _ = writeln!(out, "interface {}", self.interface);
        let _ = writeln!(out, "static ip_address={}/24", self.config.ap_ip());
        let _ = writeln!(out, "nohook wpa_supplicant");
        let _ = writeln!(out, "{BLOCK_END}");
        out
    }

    /// Pointer file telling the hostapd init scripts which config to load.
    pub fn hostapd_defaults(&self) -> String {
        format!(
            "DAEMON_CONF=\"{}\"\n",
            self.settings.paths.hostapd_conf.display()
        )
    }

    pub fn write_hostapd(&self) -> Result<PathBuf> {
        let path = self.settings.paths.hostapd_conf.clone();
        write_if_changed(&path, &self.hostapd_conf())?;
        Ok(path)
    }

    pub fn write_hostapd_defaults(&self) -> Result<PathBuf> {
        let path = self.settings.paths.hostapd_defaults.clone();
        write_if_changed(&path, &self.hostapd_defaults())?;
        Ok(path)
    }

    pub fn write_dnsmasq(&self) -> Result<PathBuf> {
        let path = self.settings.paths.dnsmasq_conf.clone();
        write_if_changed(&path, &self.dnsmasq_conf())?;
        Ok(path)
    }

    /// Insert or replace the managed block in dhcpcd.conf, keeping any
    /// operator content around it untouched.
    pub fn write_dhcpcd(&self) -> Result<PathBuf> {
        let path = self.settings.paths.dhcpcd_conf.clone();
        let existing = if path.exists() {
            fs::read_to_string(&path).map_err(|e| Error::ConfigReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            String::new()
        };
        let updated = upsert_managed_block(&existing, &self.dhcpcd_block());
        write_if_changed(&path, &updated)?;
        Ok(path)
    }

    /// All four artifacts concatenated for `--dry-run` display.
    pub fn render_all(&self) -> String {
        let paths = &self.settings.paths;
        format!(
            "### {} ###\n{}\n### {} ###\n{}\n### {} (managed block) ###\n{}\n### {} ###\n{}",
            paths.hostapd_conf.display(),
            self.hostapd_conf(),
            paths.dnsmasq_conf.display(),
            self.dnsmasq_conf(),
            paths.dhcpcd_conf.display(),
            self.dhcpcd_block(),
            paths.hostapd_defaults.display(),
            self.hostapd_defaults(),
        )
    }
}

/// Replace the marker-delimited block if present, otherwise append it.
pub fn upsert_managed_block(existing: &str, block: &str) -> String {
    let begin = existing.find(BLOCK_BEGIN);
    let end = existing.find(BLOCK_END);

    match (begin, end) {
        (Some(b), Some(e)) if e >= b => {
            // Swallow the END marker line itself
            let after = existing[e..]
                .find('\n')
                .map(|i| e + i + 1)
                .unwrap_or(existing.len());
            let mut out = String::with_capacity(existing.len() + block.len());
            out.push_str(&existing[..b]);
            out.push_str(block);
            out.push_str(&existing[after..]);
            out
        }
        _ => {
            let mut out = existing.to_string();
            if !out.is_empty() {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(block);
            out
        }
    }
}

/// Write `content` to `path` unless it is already there byte for byte.
fn write_if_changed(path: &Path, content: &str) -> Result<()> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            debug!("{} unchanged", path.display());
            return Ok(());
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::write_failed(parent, e.to_string()))?;
    }
    fs::write(path, content).map_err(|e| Error::write_failed(path, e.to_string()))?;
    info!("wrote {}", path.display());
    Ok(())
}
