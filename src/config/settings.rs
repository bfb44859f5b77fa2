//! Application configuration

use anyhow::{Context, Result};
use rg_bar_core::ModuleConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Application-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub bar: BarConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    /// Modules in display order
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl AppConfig {
    /// Load configuration from the default location
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            log::info!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "github.hilgardt_collab", "rg-bar")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        if config.version > CONFIG_VERSION {
            log::warn!(
                "Config {} has version {}, newer than supported {}",
                path.display(),
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            bar: BarConfig::default(),
            scheduler: SchedulerConfig::default(),
            ipc: IpcConfig::default(),
            modules: vec![
                ModuleEntry::new("cpu"),
                ModuleEntry::new("message"),
                ModuleEntry::new("clock"),
            ],
        }
    }
}

fn default_height() -> i32 {
    28
}

fn default_spacing() -> i32 {
    8
}

/// Bar window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarConfig {
    #[serde(default = "default_height")]
    pub height: i32,
    /// Gap between module widgets
    #[serde(default = "default_spacing")]
    pub spacing: i32,
    /// Stylesheet applied to the whole bar
    #[serde(default)]
    pub css: Option<String>,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            height: default_height(),
            spacing: default_spacing(),
            css: None,
        }
    }
}

fn default_sweep_interval_ms() -> Option<u64> {
    Some(1000)
}

/// Update scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the sweep over Periodic modules; null or 0 disables it
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: Option<u64>,
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Inbound message socket settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Defaults to `$XDG_RUNTIME_DIR/rg-bar.sock`
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

impl IpcConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(crate::ipc::default_socket_path)
    }
}

/// One module instance: which factory builds it and with what config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Factory name
    pub module: String,
    #[serde(flatten)]
    pub config: ModuleConfig,
}

impl ModuleEntry {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            config: ModuleConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }
}
