use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::blocker::{EnforcementAction, EngineSettings, WatchdogSettings};
use crate::store::LimitsTable;

/// Main app blocker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockerConfig {
    /// Monitoring loop settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Enforcement settings
    #[serde(default)]
    pub enforcement: EnforcementConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limited apps; listing an app selects it for monitoring
    #[serde(default)]
    pub apps: Vec<AppLimit>,
}

/// Monitoring loop settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Seconds between two monitoring ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Seconds between two re-block checks after a limit is reached
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,

    /// Number of re-block checks before the session ends
    #[serde(default = "default_watch_max_iterations")]
    pub watch_max_iterations: u32,
}

fn default_tick_interval() -> u64 {
    2
}

fn default_watch_interval() -> u64 {
    2
}

fn default_watch_max_iterations() -> u32 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            watch_interval_secs: default_watch_interval(),
            watch_max_iterations: default_watch_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnforcementConfig {
    /// Blocking mechanisms, tried in order until one succeeds
    #[serde(default = "EnforcementAction::default_chain")]
    pub chain: Vec<EnforcementAction>,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            chain: EnforcementAction::default_chain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Daily limit for one app
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppLimit {
    /// Package or process identifier
    pub package: String,

    /// Minutes per day; 0 means unlimited
    #[serde(default)]
    pub limit_minutes: u32,
}

impl BlockerConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tick_interval: Duration::from_secs(self.engine.tick_interval_secs),
            watchdog: WatchdogSettings {
                interval: Duration::from_secs(self.engine.watch_interval_secs),
                max_iterations: self.engine.watch_max_iterations,
            },
            chain: self.enforcement.chain.clone(),
        }
    }

    pub fn limits_table(&self) -> LimitsTable {
        self.apps
            .iter()
            .map(|app| (app.package.clone(), app.limit_minutes))
            .collect()
    }

    pub fn limit_for(&self, package: &str) -> Option<u32> {
        self.apps
            .iter()
            .find(|app| app.package == package)
            .map(|app| app.limit_minutes)
    }

    /// Add an app or change its limit
    pub fn set_limit(&mut self, package: &str, limit_minutes: u32) {
        match self.apps.iter_mut().find(|app| app.package == package) {
            Some(app) => app.limit_minutes = limit_minutes,
            None => self.apps.push(AppLimit {
                package: package.to_string(),
                limit_minutes,
            }),
        }
    }

    /// Returns false if the app was not listed
    pub fn remove_limit(&mut self, package: &str) -> bool {
        let before = self.apps.len();
        self.apps.retain(|app| app.package != package);
        self.apps.len() != before
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "app-blocker").context("Could not determine home directory")
}

/// Get the per-user config file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the per-user data directory
pub fn get_data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<BlockerConfig> {
    let config: BlockerConfig = toml::from_str(content).context("Failed to parse TOML config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<BlockerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Save configuration to TOML file
pub fn save_config(path: &Path, config: &BlockerConfig) -> Result<()> {
    validate_config(config)?;

    let content = toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &BlockerConfig) -> Result<()> {
    if config.engine.tick_interval_secs == 0 {
        anyhow::bail!("tick_interval_secs must be at least 1");
    }
    if config.engine.watch_interval_secs == 0 {
        anyhow::bail!("watch_interval_secs must be at least 1");
    }
    if config.engine.watch_max_iterations == 0 {
        anyhow::bail!("watch_max_iterations must be at least 1");
    }

    if config.enforcement.chain.is_empty() {
        anyhow::bail!("Enforcement chain must contain at least one action");
    }
    let mut actions = HashSet::new();
    for action in &config.enforcement.chain {
        if !actions.insert(action) {
            anyhow::bail!("Duplicate enforcement action: {}", action);
        }
    }

    let mut packages = HashSet::new();
    for app in &config.apps {
        if app.package.trim().is_empty() {
            anyhow::bail!("App package cannot be empty");
        }
        if !packages.insert(app.package.as_str()) {
            anyhow::bail!("Duplicate app package: {}", app.package);
        }
    }

    Ok(())
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = include_str!("../example-config.toml");
