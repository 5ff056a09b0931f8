//! Bakehouse Configuration Module
//!
//! Engine options, read from `bakehouse.yaml` (or `--config FILE`).
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`BAKEHOUSE_UNKNOWN_OPS`, `BAKEHOUSE_OUTPUT_PREFIX`,
//!    `BAKEHOUSE_SNAPSHOTS`)
//! 2. Config file
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "bakehouse.yaml";

pub const ENV_UNKNOWN_OPS: &str = "BAKEHOUSE_UNKNOWN_OPS";
pub const ENV_OUTPUT_PREFIX: &str = "BAKEHOUSE_OUTPUT_PREFIX";
pub const ENV_SNAPSHOTS: &str = "BAKEHOUSE_SNAPSHOTS";

/// What the baker does with a step whose operation id is not registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperationPolicy {
    /// No log entry, continue with the next step
    #[default]
    Skip,
    /// Error entry (`BAKE-040`), run halts
    Fail,
}

impl FromStr for UnknownOperationPolicy {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            other => Err(BakeError::ConfigError {
                reason: format!("unknown_operations must be 'skip' or 'fail', got '{}'", other),
            }),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BakeConfig {
    pub unknown_operations: UnknownOperationPolicy,

    /// Prefix for auto-generated output names
    pub output_prefix: String,

    /// Attach a copy of each produced value to its log entry
    pub snapshot_outputs: bool,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            unknown_operations: UnknownOperationPolicy::Skip,
            output_prefix: "var_".to_string(),
            snapshot_outputs: true,
        }
    }
}

impl BakeConfig {
    /// Resolve the effective config.
    ///
    /// An explicit path must exist. Without one, `bakehouse.yaml` in the
    /// working directory is used when present. Env overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.with_env()
    }

    /// Load from a YAML file. Missing or malformed files are errors.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BakeError::ConfigError {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| BakeError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with process environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key → value source (env-like)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(policy) = get(ENV_UNKNOWN_OPS) {
            self.unknown_operations = policy.parse()?;
        }

        if let Some(prefix) = get(ENV_OUTPUT_PREFIX) {
            self.output_prefix = prefix.trim().to_string();
        }

        if let Some(flag) = get(ENV_SNAPSHOTS) {
            self.snapshot_outputs = parse_flag(ENV_SNAPSHOTS, &flag)?;
        }

        Ok(self)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BakeError::ConfigError {
            reason: format!("{} must be a boolean, got '{}'", key, other),
        }),
    }
}
