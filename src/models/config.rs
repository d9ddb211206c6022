// AP Provisioner - Configuration Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Access point parameters and tool settings.
//!
//! Two layers live here. [`ProvisionerSettings`] is the persisted TOML
//! configuration with every tunable and filesystem path the tool touches,
//! so tests can redirect all of them into a temp directory.
//! [`ApConfigInput`] collects raw operator input and [`ApConfigInput::validate`]
//! turns it into an [`ApConfig`] whose fields are known-good.

use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{Error, Result};
use super::validation;

/// System-wide configuration file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/ap-provisioner/config.toml";

// ============================================================================
// Passphrase
// ============================================================================

/// WPA2 passphrase, zeroized on drop and redacted in debug output.
///
/// Deliberately not serializable; the passphrase only ever lands on disk
/// inside the rendered hostapd configuration.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw passphrase for rendering.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

// ============================================================================
// Validated access point configuration
// ============================================================================

/// Raw operator input, before validation.
#[derive(Clone, Default)]
pub struct ApConfigInput {
    pub ssid: String,
    pub passphrase: String,
    pub ap_ip: String,
    pub dhcp_start: String,
    pub dhcp_end: String,
    pub channel: u8,
    pub country_code: String,
    /// Explicit interface request; detection picks one when absent.
    pub interface: Option<String>,
}

impl ApConfigInput {
    /// Prefill everything except the passphrase from settings.
    pub fn from_settings(settings: &ProvisionerSettings) -> Self {
        Self {
            ssid: settings.ssid.clone(),
            passphrase: String::new(),
            ap_ip: settings.ap_ip.clone(),
            dhcp_start: settings.dhcp_start.clone(),
            dhcp_end: settings.dhcp_end.clone(),
            channel: settings.channel,
            country_code: settings.country_code.clone(),
            interface: None,
        }
    }

    /// Validate every field and produce a usable configuration.
    pub fn validate(mut self) -> Result<ApConfig> {
        let ssid = validation::validate_ssid(&self.ssid)?;
        validation::validate_passphrase(&self.passphrase)?;
        let ap_ip = validation::validate_ipv4(&self.ap_ip)?;
        let dhcp_start = validation::validate_ipv4(&self.dhcp_start)?;
        let dhcp_end = validation::validate_ipv4(&self.dhcp_end)?;
        validation::validate_dhcp_range(ap_ip, dhcp_start, dhcp_end)?;
        let channel = validation::validate_channel(self.channel)?;
        let country_code = validation::validate_country_code(&self.country_code)?;

        let passphrase = Passphrase::new(std::mem::take(&mut self.passphrase));
        Ok(ApConfig {
            ssid,
            passphrase,
            ap_ip,
            dhcp_start,
            dhcp_end,
            channel,
            country_code,
            interface: self.interface.take(),
        })
    }
}

impl fmt::Debug for ApConfigInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApConfigInput")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("ap_ip", &self.ap_ip)
            .field("dhcp_start", &self.dhcp_start)
            .field("dhcp_end", &self.dhcp_end)
            .field("channel", &self.channel)
            .field("country_code", &self.country_code)
            .field("interface", &self.interface)
            .finish()
    }
}

/// Validated access point configuration.
///
/// Constructed only through [`ApConfigInput::validate`], so downstream
/// consumers never re-check field invariants.
#[derive(Clone)]
pub struct ApConfig {
    ssid: String,
    passphrase: Passphrase,
    ap_ip: Ipv4Addr,
    dhcp_start: Ipv4Addr,
    dhcp_end: Ipv4Addr,
    channel: u8,
    country_code: String,
    interface: Option<String>,
}

impl ApConfig {
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> &Passphrase {
        &self.passphrase
    }

    pub fn ap_ip(&self) -> Ipv4Addr {
        self.ap_ip
    }

    pub fn dhcp_start(&self) -> Ipv4Addr {
        self.dhcp_start
    }

    pub fn dhcp_end(&self) -> Ipv4Addr {
        self.dhcp_end
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Record the interface chosen by detection.
    pub fn set_interface(&mut self, interface: impl Into<String>) {
        self.interface = Some(interface.into());
    }
}

impl fmt::Debug for ApConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApConfig")
            .field("ssid", &self.ssid)
            .field("passphrase", &self.passphrase)
            .field("ap_ip", &self.ap_ip)
            .field("dhcp_start", &self.dhcp_start)
            .field("dhcp_end", &self.dhcp_end)
            .field("channel", &self.channel)
            .field("country_code", &self.country_code)
            .field("interface", &self.interface)
            .finish()
    }
}

// ============================================================================
// Persisted settings
// ============================================================================

fn default_ssid() -> String {
    "RadxaAP".to_string()
}

fn default_ap_ip() -> String {
    "192.168.4.1".to_string()
}

fn default_dhcp_start() -> String {
    "192.168.4.2".to_string()
}

fn default_dhcp_end() -> String {
    "192.168.4.20".to_string()
}

fn default_channel() -> u8 {
    7
}

fn default_country_code() -> String {
    "PK".to_string()
}

fn default_dns_servers() -> Vec<String> {
    vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()]
}

fn default_lease_time() -> String {
    "24h".to_string()
}

fn default_cache_size() -> u32 {
    300
}

fn default_max_stations() -> u32 {
    32
}

fn default_fallback_upstream() -> String {
    "eth0".to_string()
}

fn default_settle_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Tool settings, persisted as TOML.
///
/// The passphrase is intentionally absent; it is prompted for or passed on
/// the command line and never written back here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerSettings {
    /// Default network name.
    #[serde(default = "default_ssid")]
    pub ssid: String,
    /// Static address the AP interface takes.
    #[serde(default = "default_ap_ip")]
    pub ap_ip: String,
    /// First address handed out by DHCP.
    #[serde(default = "default_dhcp_start")]
    pub dhcp_start: String,
    /// Last address handed out by DHCP.
    #[serde(default = "default_dhcp_end")]
    pub dhcp_end: String,
    /// 2.4 GHz channel.
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Regulatory domain.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Upstream resolvers advertised to clients.
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,
    /// DHCP lease duration in dnsmasq notation.
    #[serde(default = "default_lease_time")]
    pub lease_time: String,
    /// dnsmasq DNS cache size.
    #[serde(default = "default_cache_size")]
    pub cache_size: u32,
    /// hostapd station limit.
    #[serde(default = "default_max_stations")]
    pub max_stations: u32,
    /// Interface assumed to carry internet when no default route exists.
    #[serde(default = "default_fallback_upstream")]
    pub fallback_upstream: String,
    /// How long to wait for services to settle during verification.
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
    /// Poll interval while waiting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Filesystem locations the tool reads and writes.
    #[serde(default)]
    pub paths: Paths,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            ssid: default_ssid(),
            ap_ip: default_ap_ip(),
            dhcp_start: default_dhcp_start(),
            dhcp_end: default_dhcp_end(),
            channel: default_channel(),
            country_code: default_country_code(),
            dns_servers: default_dns_servers(),
            lease_time: default_lease_time(),
            cache_size: default_cache_size(),
            max_stations: default_max_stations(),
            fallback_upstream: default_fallback_upstream(),
            settle_timeout_secs: default_settle_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            paths: Paths::default(),
        }
    }
}

impl ProvisionerSettings {
    /// Per-user configuration file, used when running unprivileged.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ap-provisioner").join("config.toml"))
    }

    /// Load settings, preferring an explicit path, then the user file,
    /// then the system file, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(user) = Self::user_config_path() {
            if user.exists() {
                return Self::load_from(&user);
            }
        }
        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.exists() {
            return Self::load_from(system);
        }
        Ok(Self::default())
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Persist settings with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::ConfigWriteFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::ConfigWriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Check the tunables that validation of operator input never sees.
    pub fn validate(&self) -> Result<()> {
        for server in &self.dns_servers {
            validation::validate_ipv4(server)?;
        }
        if !lease_time_is_valid(&self.lease_time) {
            return Err(Error::ValidationFailed(format!(
                "invalid lease time: {}",
                self.lease_time
            )));
        }
        if self.max_stations == 0 {
            return Err(Error::ValidationFailed(
                "max_stations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// dnsmasq lease notation: a number with an s/m/h/d suffix, or "infinite".
fn lease_time_is_valid(lease: &str) -> bool {
    if lease == "infinite" {
        return true;
    }
    let Some(digits) = lease.strip_suffix(['s', 'm', 'h', 'd']) else {
        return false;
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// Filesystem locations
// ============================================================================

fn default_hostapd_conf() -> PathBuf {
    PathBuf::from("/etc/hostapd/hostapd.conf")
}

fn default_hostapd_defaults() -> PathBuf {
    PathBuf::from("/etc/default/hostapd")
}

fn default_dnsmasq_conf() -> PathBuf {
    PathBuf::from("/etc/dnsmasq.conf")
}

fn default_dhcpcd_conf() -> PathBuf {
    PathBuf::from("/etc/dhcpcd.conf")
}

fn default_sysctl_dropin() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/99-ap-provisioner.conf")
}

fn default_iptables_rules() -> PathBuf {
    PathBuf::from("/etc/iptables/rules.v4")
}

fn default_proc_forward() -> PathBuf {
    PathBuf::from("/proc/sys/net/ipv4/ip_forward")
}

fn default_sysfs_net() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/ap-provisioner")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/run/ap-provisioner.lock")
}

/// Every filesystem location the tool touches, overridable for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    #[serde(default = "default_hostapd_conf")]
    pub hostapd_conf: PathBuf,
    #[serde(default = "default_hostapd_defaults")]
    pub hostapd_defaults: PathBuf,
    #[serde(default = "default_dnsmasq_conf")]
    pub dnsmasq_conf: PathBuf,
    #[serde(default = "default_dhcpcd_conf")]
    pub dhcpcd_conf: PathBuf,
    #[serde(default = "default_sysctl_dropin")]
    pub sysctl_dropin: PathBuf,
    #[serde(default = "default_iptables_rules")]
    pub iptables_rules: PathBuf,
    #[serde(default = "default_proc_forward")]
    pub proc_forward: PathBuf,
    #[serde(default = "default_sysfs_net")]
    pub sysfs_net: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            hostapd_conf: default_hostapd_conf(),
            hostapd_defaults: default_hostapd_defaults(),
            dnsmasq_conf: default_dnsmasq_conf(),
            dhcpcd_conf: default_dhcpcd_conf(),
            sysctl_dropin: default_sysctl_dropin(),
            iptables_rules: default_iptables_rules(),
            proc_forward: default_proc_forward(),
            sysfs_net: default_sysfs_net(),
            state_dir: default_state_dir(),
            lock_file: default_lock_file(),
        }
    }
}

impl Paths {
    /// Point every location into a test root.
    #[cfg(test)]
    pub fn under(root: &Path) -> Self {
        Self {
            hostapd_conf: root.join("etc/hostapd/hostapd.conf"),
            hostapd_defaults: root.join("etc/default/hostapd"),
            dnsmasq_conf: root.join("etc/dnsmasq.conf"),
            dhcpcd_conf: root.join("etc/dhcpcd.conf"),
            sysctl_dropin: root.join("etc/sysctl.d/99-ap-provisioner.conf"),
            iptables_rules: root.join("etc/iptables/rules.v4"),
            proc_forward: root.join("proc/ip_forward"),
            sysfs_net: root.join("sys/class/net"),
            state_dir: root.join("var/lib/ap-provisioner"),
            lock_file: root.join("run/ap-provisioner.lock"),
        }
    }
}
