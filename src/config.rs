//! Engine Configuration
//!
//! Settings are read from YAML (`--config <file>`, else `procflow.yaml` in
//! the working directory when present), then environment overrides apply:
//!
//! | Variable            | Overrides            |
//! |---------------------|----------------------|
//! | `PROCFLOW_DATA_DIR` | `data_dir`           |
//! | `PROCFLOW_PYTHON`   | `script.python_path` |
//!
//! ```yaml
//! data_dir: .procflow
//! max_step_dispatches: 10000
//! script:
//!   python_path: python3
//!   timeout_seconds: 60
//!   max_output_bytes: 1048576
//! approvals:
//!   domain_owner_fallback: domain-owner@example.com
//!   project_owner_fallback: project-owner@example.com
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "procflow.yaml";

/// Default safety limit on step dispatches per engine call.
pub const DEFAULT_MAX_STEP_DISPATCHES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root for execution records, registered workflows and policies
    pub data_dir: PathBuf,
    pub max_step_dispatches: usize,
    pub script: ScriptConfig,
    pub approvals: ApprovalConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".procflow"),
            max_step_dispatches: DEFAULT_MAX_STEP_DISPATCHES,
            script: ScriptConfig::default(),
            approvals: ApprovalConfig::default(),
        }
    }
}

/// Script sandbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub python_path: String,
    /// Wall-clock limit; a step's own `timeout_seconds` takes precedence
    pub timeout_seconds: u64,
    /// Combined stdout/stderr cap before the script is killed
    pub max_output_bytes: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            python_path: "python3".to_string(),
            timeout_seconds: 60,
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Addresses used when an approver alias cannot be resolved from the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub domain_owner_fallback: String,
    pub project_owner_fallback: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            domain_owner_fallback: "domain-owner@example.com".to_string(),
            project_owner_fallback: "project-owner@example.com".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.check()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolves the effective configuration.
    ///
    /// An explicit path must exist; otherwise [`DEFAULT_CONFIG_FILE`] is used
    /// if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> EngineResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `PROCFLOW_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PROCFLOW_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            debug!("PROCFLOW_DATA_DIR override: {}", dir);
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(python) = lookup("PROCFLOW_PYTHON").filter(|v| !v.trim().is_empty()) {
            debug!("PROCFLOW_PYTHON override: {}", python);
            self.script.python_path = python;
        }
    }

    fn check(&self) -> EngineResult<()> {
        if self.max_step_dispatches == 0 {
            return Err(EngineError::Config(
                "max_step_dispatches must be at least 1".to_string(),
            ));
        }
        if self.script.timeout_seconds == 0 {
            return Err(EngineError::Config(
                "script.timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policies_path(&self) -> PathBuf {
        self.data_dir.join("policies.yaml")
    }
}
