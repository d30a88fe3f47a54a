//! Configuration for signing operations.
//!
//! `SigningConfig` is plain data and can be loaded from JSON. Process-wide
//! collaborators (crypto provider, trusted certificates) are not part of it;
//! they are passed explicitly to the orchestrator and coordinator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of DER bytes reserved for the signature container.
pub const DEFAULT_PLACEHOLDER_SIZE: usize = 8192;

/// Default timeout for OCSP, CRL, TSA and AIA requests.
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 30;

/// Order in which revocation sources are consulted for each certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevocationPreference {
    /// Query OCSP first and fall back to the CRL only when OCSP yields nothing
    #[default]
    OcspThenCrl,
    /// Query both OCSP and CRL and embed everything returned
    Both,
}

/// Revocation collection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RevocationPolicy {
    /// Source ordering
    pub preference: RevocationPreference,
    /// Fail when any chain member (not just the signing certificate)
    /// lacks revocation evidence and is not exempted
    pub strict_chain: bool,
}

/// Signing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Directory used to buffer prepared documents instead of memory.
    /// Must exist and be a directory.
    pub temp_dir: Option<PathBuf>,

    /// Timeout applied to each network exchange.
    pub network_timeout_secs: u64,

    /// Placeholder size used when a caller does not request one and
    /// automatic estimation is disabled.
    pub default_placeholder_size: usize,

    /// Estimate the placeholder from the certificates, algorithms and
    /// timestamp client instead of using `default_placeholder_size`.
    pub estimate_placeholder: bool,

    /// User-Agent sent by the HTTP clients.
    pub user_agent: String,

    /// Revocation collection policy.
    pub revocation: RevocationPolicy,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self {
            temp_dir: None,
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
            default_placeholder_size: DEFAULT_PLACEHOLDER_SIZE,
            estimate_placeholder: true,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
            revocation: RevocationPolicy::default(),
        }
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SigningConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Buffer prepared documents in `dir`. The directory is checked immediately.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        check_temp_dir(&dir)?;
        self.temp_dir = Some(dir);
        Ok(self)
    }

    /// Set the network timeout in seconds.
    pub fn with_network_timeout(mut self, secs: u64) -> Self {
        self.network_timeout_secs = secs;
        self
    }

    /// Set the fallback placeholder size.
    pub fn with_default_placeholder_size(mut self, size: usize) -> Self {
        self.default_placeholder_size = size;
        self
    }

    /// Enable or disable placeholder estimation.
    pub fn with_placeholder_estimation(mut self, enable: bool) -> Self {
        self.estimate_placeholder = enable;
        self
    }

    /// Set the HTTP User-Agent.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the revocation policy.
    pub fn with_revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.revocation = policy;
        self
    }

    /// Validate every field.
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.temp_dir {
            check_temp_dir(dir)?;
        }
        if self.network_timeout_secs == 0 {
            return Err(Error::InvalidConfig("network_timeout_secs must be positive".into()));
        }
        if self.default_placeholder_size == 0 {
            return Err(Error::InvalidConfig("default_placeholder_size must be positive".into()));
        }
        Ok(())
    }

    /// Network timeout as a `Duration`.
    pub fn network_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.network_timeout_secs)
    }
}

fn check_temp_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "temp_dir {} does not exist or is not a directory",
            dir.display()
        )))
    }
}
