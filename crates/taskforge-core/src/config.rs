//! User configuration loaded from `~/.taskforge/config.toml`
//!
//! Every field has a default, so a missing file or a partial file both work.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::strategy::{ExecutionStrategy, StrategyPreset};

pub const DEFAULT_MAX_EXECUTION_ROUNDS: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskforgeConfig {
    pub max_execution_rounds: usize,
    /// Snapshot location override; `~/` is expanded
    pub sessions_file: Option<String>,
    pub strategy: StrategyConfig,
    pub tools: ToolSettings,
}

impl Default for TaskforgeConfig {
    fn default() -> Self {
        Self {
            max_execution_rounds: DEFAULT_MAX_EXECUTION_ROUNDS,
            sessions_file: None,
            strategy: StrategyConfig::default(),
            tools: ToolSettings::default(),
        }
    }
}

impl TaskforgeConfig {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load from the default location
    pub fn load_default() -> Result<Self> {
        Self::load(&crate::paths::config_file())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.max_execution_rounds == 0 {
            anyhow::bail!("max_execution_rounds must be positive");
        }
        Ok(config)
    }

    pub fn sessions_path(&self) -> PathBuf {
        match &self.sessions_file {
            Some(path) => crate::paths::expand_home(path),
            None => crate::paths::sessions_file(),
        }
    }
}

/// Strategy section: a preset plus optional per-field overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub preset: StrategyPreset,
    pub allow_file_operations: Option<bool>,
    pub allow_network_operations: Option<bool>,
    pub allow_system_operations: Option<bool>,
    pub allow_repository_operations: Option<bool>,
    pub confirmation_required: Option<Vec<String>>,
    pub low_confidence_threshold: Option<f64>,
}

impl StrategyConfig {
    pub fn to_strategy(&self) -> ExecutionStrategy {
        let mut strategy = ExecutionStrategy::from_preset(self.preset);
        if let Some(v) = self.allow_file_operations {
            strategy.allow_file_operations = v;
        }
        if let Some(v) = self.allow_network_operations {
            strategy.allow_network_operations = v;
        }
        if let Some(v) = self.allow_system_operations {
            strategy.allow_system_operations = v;
        }
        if let Some(v) = self.allow_repository_operations {
            strategy.allow_repository_operations = v;
        }
        if let Some(list) = &self.confirmation_required {
            strategy.confirmation_required = list.iter().cloned().collect();
        }
        if let Some(threshold) = self.low_confidence_threshold {
            strategy.low_confidence_threshold = threshold;
        }
        strategy
    }
}

/// Settings consumed by individual tool handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Blocking `launch-process` timeout when the call gives none
    pub default_process_timeout_secs: u64,
    /// HTML endpoint queried by `web-search` with a `q` parameter
    pub search_endpoint: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            default_process_timeout_secs: 60,
            search_endpoint: "https://html.duckduckgo.com/html/".to_string(),
        }
    }
}
