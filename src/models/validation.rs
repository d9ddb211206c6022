// AP Provisioner - Validation Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Input validation for access point parameters.
//!
//! Everything the operator supplies passes through here before an
//! [`ApConfig`](super::config::ApConfig) is constructed; no component
//! downstream of validation re-checks these invariants.

use std::net::Ipv4Addr;
use std::str::FromStr;

use super::error::{Error, Result};

/// Maximum SSID length in bytes (IEEE 802.11).
pub const MAX_SSID_LEN: usize = 32;

/// WPA2-PSK passphrase length bounds in bytes.
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;

/// Validate an IPv4 address string.
pub fn validate_ipv4(s: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(s.trim()).map_err(|_| Error::InvalidIpAddress(s.to_string()))
}

/// Validate an SSID (1-32 bytes, no control characters).
pub fn validate_ssid(s: &str) -> Result<String> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidSsid("SSID cannot be empty".to_string()));
    }
    if s.len() > MAX_SSID_LEN {
        return Err(Error::InvalidSsid(format!(
            "SSID must be at most {} bytes: {}",
            MAX_SSID_LEN, s
        )));
    }
    if s.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidSsid(
            "SSID cannot contain control characters".to_string(),
        ));
    }
    Ok(s.to_string())
}

/// Validate a WPA2-PSK passphrase (8-63 bytes, printable ASCII).
pub fn validate_passphrase(s: &str) -> Result<()> {
    if s.len() < MIN_PASSPHRASE_LEN {
        return Err(Error::InvalidPassphrase(format!(
            "passphrase must be at least {} characters",
            MIN_PASSPHRASE_LEN
        )));
    }
    if s.len() > MAX_PASSPHRASE_LEN {
        return Err(Error::InvalidPassphrase(format!(
            "passphrase must be at most {} characters",
            MAX_PASSPHRASE_LEN
        )));
    }
    if !s.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(Error::InvalidPassphrase(
            "passphrase must be printable ASCII".to_string(),
        ));
    }
    Ok(())
}

/// Validate a 2.4 GHz channel number.
pub fn validate_channel(channel: u8) -> Result<u8> {
    if !(1..=13).contains(&channel) {
        return Err(Error::InvalidChannel(channel));
    }
    Ok(channel)
}

/// Validate a two-letter regulatory country code, normalized to uppercase.
pub fn validate_country_code(s: &str) -> Result<String> {
    let normalized = s.trim().to_uppercase();
    if normalized.len() != 2 || !normalized.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Error::InvalidCountryCode(s.to_string()));
    }
    Ok(normalized)
}

/// Validate a DHCP range against the AP address.
///
/// Both range ends must sit inside the AP address's /24, and the start's
/// last octet must be strictly below the end's.
pub fn validate_dhcp_range(ap_ip: Ipv4Addr, start: Ipv4Addr, end: Ipv4Addr) -> Result<()> {
    let ap = ap_ip.octets();
    let s = start.octets();
    let e = end.octets();

    if s[..3] != ap[..3] {
        return Err(Error::InvalidDhcpRange(format!(
            "range start {} is outside {}.{}.{}.0/24",
            start, ap[0], ap[1], ap[2]
        )));
    }
    if e[..3] != ap[..3] {
        return Err(Error::InvalidDhcpRange(format!(
            "range end {} is outside {}.{}.{}.0/24",
            end, ap[0], ap[1], ap[2]
        )));
    }
    if s[3] >= e[3] {
        return Err(Error::InvalidDhcpRange(format!(
            "range start {} must be below range end {}",
            start, end
        )));
    }
    Ok(())
}
