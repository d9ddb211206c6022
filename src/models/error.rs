// AP Provisioner - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the AP Provisioner.

use thiserror::Error;

/// Result type alias for AP Provisioner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for AP Provisioner operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Privilege / Locking Errors
    // ========================================
    #[error("Root privileges required: {0}")]
    PrivilegeRequired(String),

    #[error("Another provisioning run is active (pid {pid}); remove {lock_path} if this is wrong")]
    AlreadyRunning { pid: u32, lock_path: String },

    // ========================================
    // Interface Detection Errors
    // ========================================
    #[error("No wireless interface found on this system")]
    NoInterfaceFound,

    #[error("Wireless interface unusable: {0}")]
    InterfaceUnusable(String),

    // ========================================
    // Validation Errors
    // ========================================
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid SSID: {0}")]
    InvalidSsid(String),

    #[error("Invalid passphrase: {0}")]
    InvalidPassphrase(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid DHCP range: {0}")]
    InvalidDhcpRange(String),

    #[error("Invalid channel {0}: expected a 2.4 GHz channel (1-13)")]
    InvalidChannel(u8),

    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),

    // ========================================
    // Package Errors
    // ========================================
    #[error("Failed to install package {package}: {reason}")]
    PackageInstallFailed { package: String, reason: String },

    // ========================================
    // Configuration Artifact Errors
    // ========================================
    #[error("Failed to read configuration {path}: {reason}")]
    ConfigReadFailed { path: String, reason: String },

    #[error("Failed to write configuration {path}: {reason}")]
    ConfigWriteFailed { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    // ========================================
    // NAT / Firewall Errors
    // ========================================
    #[error("Firewall rule installation failed: {action} - {reason}")]
    RuleInstallFailed { action: String, reason: String },

    // ========================================
    // Service Errors
    // ========================================
    #[error("Service {service} failed to start")]
    ServiceStartFailed { service: String, diagnostics: String },

    #[error("Timed out waiting for {0}")]
    VerificationTimeout(String),

    // ========================================
    // Storage Errors
    // ========================================
    #[error("No backups recorded; nothing to roll back")]
    NoBackupsFound,

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Prompt aborted: {0}")]
    Prompt(String),
}

impl Error {
    /// Create a new command failed error.
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a new rule installation error.
    pub fn rule_install(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RuleInstallFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Create a new config write error.
    pub fn write_failed(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::ConfigWriteFailed {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new service start error carrying captured diagnostics.
    pub fn service_start(service: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::ServiceStartFailed {
            service: service.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Diagnostic text captured alongside the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ServiceStartFailed { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }

    /// Check if this error stems from invalid operator input.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_)
                | Self::InvalidSsid(_)
                | Self::InvalidPassphrase(_)
                | Self::InvalidIpAddress(_)
                | Self::InvalidDhcpRange(_)
                | Self::InvalidChannel(_)
                | Self::InvalidCountryCode(_)
        )
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}
