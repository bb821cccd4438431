//! Engine configuration
//!
//! Loaded from `engine.toml` (see [`default_path`]). Every field has a
//! default, so an empty file is a valid configuration.

pub mod parser;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::trust::decode_public_key;

pub use parser::{load, parse_str, to_toml};

/// File name of the engine configuration inside the config directory.
pub const CONFIG_FILE: &str = "engine.toml";

/// What the driver does after a phase ends in `Error`.
///
/// Cancellation and trust failures always stop the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop before the next phase
    #[default]
    Abort,
    /// Keep running later phases and report everything at the end
    Continue,
}

/// Per-phase overrides of progress weighting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,

    /// `[pre, main, post]` sub-weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<[u64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub max_parallel: usize,
    pub http_timeout_secs: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_parallel: crate::collect::DEFAULT_MAX_PARALLEL,
            http_timeout_secs: 60,
        }
    }
}

impl CollectConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Accept artifacts that carry no signature metadata at all
    pub allow_unsigned: bool,

    /// Trusted signers: name -> base64 ed25519 public key
    pub keys: BTreeMap<String, String>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            allow_unsigned: true,
            keys: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub failure_policy: FailurePolicy,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub phases: BTreeMap<String, PhaseConfig>,

    pub collect: CollectConfig,

    pub trust: TrustConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, phase_id: &str) -> Option<&PhaseConfig> {
        self.phases.get(phase_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, phase) in &self.phases {
            if phase.split.is_some_and(|split| split.iter().sum::<u64>() == 0) {
                return Err(ConfigError::ZeroWorkSplit(id.clone()));
            }
        }
        if self.collect.max_parallel == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.collect.http_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        for (name, key) in &self.trust.keys {
            decode_public_key(name, key)?;
        }
        Ok(())
    }
}

/// `<config dir>/stow/engine.toml`
pub fn default_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dir.join("stow").join(CONFIG_FILE))
}
