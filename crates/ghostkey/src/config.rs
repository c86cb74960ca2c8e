use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ghostkey_bridge::BridgeConfig;
use ghostkey_core::KdfParams;

use crate::error::{RootError, RootResult};

/// Settings for the authentication bridge host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeSection {
    /// Seconds a request may wait for the privileged side before it
    /// resolves as a timeout.
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,

    /// Bound on requests queued towards the privileged side.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_bridge_timeout() -> u64 {
    120
}

fn default_channel_capacity() -> usize {
    ghostkey_bridge::DEFAULT_CHANNEL_CAPACITY
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_bridge_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BridgeSection {
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Where blinded keys are sent for signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuanceSection {
    /// Base URL of the signing service; `/sign-certificate` is appended.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_issuance_timeout")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_issuance_timeout() -> u64 {
    30
}

impl Default for IssuanceSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_issuance_timeout(),
        }
    }
}

/// Top-level configuration for the ghostkey binary.
///
/// Loaded from a TOML file (typically `~/.ghostkey/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootConfig {
    /// SQLite file holding the encrypted vault.
    #[serde(default = "default_vault_path")]
    pub vault_path: PathBuf,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base64 Ed25519 key that endorses delegate certificates. Without it
    /// nothing can be issued or verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_verifying_key: Option<String>,

    /// Argon2id cost for deriving the vault key from the password.
    #[serde(default)]
    pub kdf: KdfParams,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub issuance: IssuanceSection,
}

fn default_vault_path() -> PathBuf {
    dirs_or_default(".ghostkey/vault.db")
}

fn default_data_dir() -> PathBuf {
    dirs_or_default(".ghostkey")
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            data_dir: default_data_dir(),
            master_verifying_key: None,
            kdf: KdfParams::default(),
            bridge: BridgeSection::default(),
            issuance: IssuanceSection::default(),
        }
    }
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        self.kdf
            .validate()
            .map_err(|e| RootError::Config(e.to_string()))?;
        if self.bridge.timeout_secs == 0 {
            return Err(RootError::Config("bridge.timeout_secs must be > 0".into()));
        }
        if self.bridge.channel_capacity == 0 {
            return Err(RootError::Config(
                "bridge.channel_capacity must be > 0".into(),
            ));
        }
        if !self.issuance.endpoint.starts_with("http://")
            && !self.issuance.endpoint.starts_with("https://")
        {
            return Err(RootError::Config(format!(
                "issuance.endpoint must be an http(s) URL, got '{}'",
                self.issuance.endpoint
            )));
        }
        if self.issuance.timeout_secs == 0 {
            return Err(RootError::Config(
                "issuance.timeout_secs must be > 0".into(),
            ));
        }
        if let Some(key) = &self.master_verifying_key {
            parse_master_key(key)?;
        }
        Ok(())
    }

    /// The configured master verifying key.
    pub fn master_key(&self) -> RootResult<[u8; 32]> {
        match &self.master_verifying_key {
            Some(key) => parse_master_key(key),
            None => Err(RootError::Config(
                "master_verifying_key is not set; add it to the config or pass --master-key".into(),
            )),
        }
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".ghostkey/config.toml")
    }
}

/// Decode a base64 Ed25519 verifying key.
pub fn parse_master_key(text: &str) -> RootResult<[u8; 32]> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| RootError::Config(format!("master_verifying_key: {}", e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        RootError::Config(format!(
            "master_verifying_key must be 32 bytes, got {}",
            b.len()
        ))
    })
}
