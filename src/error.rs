//! Error types for the APIBAN nftables client.

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for firewall-interaction failures (bootstrap, flush).
pub const EXIT_FIREWALL: u8 = 2;

/// Exit status for configuration, permission and feed failures.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Error, Debug)]
pub enum ApibanError {
    #[error("Failed to locate configuration file (searched: {searched})")]
    ConfigMissing { searched: String },

    #[error("Failed to parse configuration {path:?}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to write configuration to {path:?}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error finding an input chain: {0}")]
    BootstrapNoChain(String),

    #[error("Unable to create set {set}: {reason}")]
    BootstrapSetCreate { set: String, reason: String },

    #[error("Cannot verify nftables set {set}: {reason}")]
    SetUnavailable { set: String, reason: String },

    #[error("Flushing nftables set {set} failed: {reason}")]
    FlushFailed { set: String, reason: String },

    #[error("Failed to get banned list: {0}")]
    FetchPermanent(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Lock unavailable: {0}")]
    Locked(String),
}

impl ApibanError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::BootstrapNoChain(_)
            | Self::BootstrapSetCreate { .. }
            | Self::SetUnavailable { .. }
            | Self::FlushFailed { .. } => EXIT_FIREWALL,
            _ => EXIT_FAILURE,
        }
    }
}
