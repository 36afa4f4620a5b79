//! TOML configuration: run defaults and audit log location.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::rebalance::Mode;

/// Top-level configuration. Every field has a default, so an empty file
/// (or no file at all) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rebalance: RebalanceDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceDefaults {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub allow_fractional: bool,
    #[serde(default)]
    pub min_trade_notional: f64,
    #[serde(default = "default_asset_type")]
    pub default_asset_type: String,
}

fn default_mode() -> String {
    "TRADE".into()
}
fn default_asset_type() -> String {
    "STOCK".into()
}

impl Default for RebalanceDefaults {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            allow_fractional: false,
            min_trade_notional: 0.0,
            default_asset_type: default_asset_type(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let _: Mode = self.rebalance.mode.parse()?;
        if self.rebalance.min_trade_notional < 0.0 {
            return Err(Error::Config("min_trade_notional must be >= 0".into()));
        }
        if self.rebalance.default_asset_type.trim().is_empty() {
            return Err(Error::Config("default_asset_type must not be empty".into()));
        }
        Ok(())
    }

    /// The configured default mode.
    pub fn mode(&self) -> Result<Mode> {
        self.rebalance.mode.parse()
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
