//! Configuration management: the persistent JSON state document.
//!
//! The document carries the API key, the feed cursor (LKID), the flush epoch
//! and the set name. It is both operator input and the client's durable
//! state, so it is rewritten in place after a quiescent run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ApibanError;
use crate::validation::is_valid_identifier;

/// Version tag written on every load
pub const CONFIG_VERSION: &str = "nft1.0";

/// Cursor value that starts the feed from the beginning
pub const START_CURSOR: &str = "100";

/// API key shipped in the sample configuration
const PLACEHOLDER_API_KEY: &str = "MY API KEY";

/// Conventional locations searched after the explicit path and user config dir
const STATIC_LOCATIONS: &[&str] = &[
    "/etc/apiban/config.json",
    "config.json",
    "/usr/local/bin/apiban/config.json",
];

/// Secure string type that zeroizes memory on drop
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The persistent client configuration.
///
/// Field order matches the on-disk key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApibanConfig {
    /// APIBAN API key
    #[serde(rename = "apikey")]
    pub api_key: SecureString,

    /// Last consumed feed position (LKID)
    #[serde(rename = "lkid")]
    pub cursor: String,

    /// Client/schema version tag
    pub version: String,

    /// Unix seconds of the most recent set flush
    #[serde(rename = "flush")]
    pub flush_epoch: String,

    /// Feed variant, passed through to the feed
    pub dataset: String,

    /// nftables set to populate
    #[serde(rename = "setname")]
    pub set_name: String,

    #[serde(skip)]
    source_path: PathBuf,
}

impl ApibanConfig {
    /// Build the ordered list of locations to search.
    ///
    /// The explicit path comes first, then the user configuration directory
    /// (when resolvable), then the conventional system locations.
    pub fn search_locations(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut locations = Vec::new();

        if let Some(path) = explicit {
            locations.push(path.to_path_buf());
        }

        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("apiban").join("config.json"));
        }

        locations.extend(STATIC_LOCATIONS.iter().map(PathBuf::from));
        locations
    }

    /// Load the configuration from the standard search order.
    pub fn load(explicit: Option<&Path>, now: i64) -> Result<Self, ApibanError> {
        Self::load_from(&Self::search_locations(explicit), now)
    }

    /// Load from the first readable location.
    ///
    /// A location that cannot be read is skipped. A location that can be read
    /// but does not parse stops the search.
    pub fn load_from(locations: &[PathBuf], now: i64) -> Result<Self, ApibanError> {
        for location in locations {
            let content = match fs::read(location) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping config location {:?}: {}", location, e);
                    continue;
                }
            };

            let mut config: ApibanConfig =
                serde_json::from_slice(&content).map_err(|source| ApibanError::ConfigMalformed {
                    path: location.clone(),
                    source,
                })?;

            config.source_path = location.clone();
            config.normalize(now);
            config.validate()?;

            info!("Loaded configuration from {:?}", location);
            return Ok(config);
        }

        Err(ApibanError::ConfigMissing {
            searched: locations
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Apply load-time defaults.
    fn normalize(&mut self, now: i64) {
        self.version = CONFIG_VERSION.to_string();

        if self.cursor.is_empty() {
            info!("Resetting LKID");
            self.cursor = START_CURSOR.to_string();
        }

        if self.flush_epoch.is_empty() {
            info!("Resetting FLUSH");
            self.flush_epoch = now.to_string();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ApibanError> {
        if self.api_key.is_empty() || self.api_key.as_str() == PLACEHOLDER_API_KEY {
            warn!(
                "\"{}\" is not a valid APIBAN key. Please go to apiban.org and get a valid API key.",
                self.api_key.as_str()
            );
            return Err(ApibanError::ConfigInvalid("Invalid APIKEY".to_string()));
        }

        if !is_valid_identifier(&self.set_name) {
            return Err(ApibanError::ConfigInvalid(format!(
                "Invalid setname '{}'. Use letters, digits, '_', '.' or '-'",
                self.set_name
            )));
        }

        Ok(())
    }

    /// Flush epoch in Unix seconds.
    ///
    /// A value that does not parse counts as the epoch itself, which makes
    /// the next run flush and rewrite it.
    pub fn flush_epoch_secs(&self) -> i64 {
        match self.flush_epoch.trim().parse() {
            Ok(secs) => secs,
            Err(_) => {
                warn!("Unreadable flush timestamp '{}', treating as 0", self.flush_epoch);
                0
            }
        }
    }

    /// Record a flush at `now`.
    pub fn mark_flushed(&mut self, now: i64) {
        self.flush_epoch = now.max(self.flush_epoch_secs()).to_string();
        self.cursor = START_CURSOR.to_string();
    }

    /// Restart the feed from its first position.
    pub fn reset_cursor(&mut self) {
        self.cursor = START_CURSOR.to_string();
    }

    /// Location the configuration was loaded from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Point the configuration at a file, for configurations built in code.
    pub fn with_source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_path = path.into();
        self
    }

    /// Rewrite the source file atomically.
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn persist(&self) -> Result<(), ApibanError> {
        let path = self.source_path.as_path();
        let write_err = |source: std::io::Error| ApibanError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        content.push('\n');

        // Create temporary file in the same directory for atomic rename
        let parent_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir).map_err(write_err)?;

        temp_file.write_all(content.as_bytes()).map_err(write_err)?;
        temp_file.as_file().sync_all().map_err(write_err)?;

        temp_file.persist(path).map_err(|e| write_err(e.error))?;

        debug!("Persisted configuration to {:?}", path);
        Ok(())
    }
}
