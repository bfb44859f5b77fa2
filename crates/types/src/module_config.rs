//! Typed configuration shared by every module

use crate::UpdateMode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Problems found while validating a module configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("update interval must be greater than zero")]
    ZeroInterval,
    #[error("module name must not be empty")]
    EmptyName,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Configuration handed to a factory and to `Module::initialize`
///
/// The conventional keys are typed fields; anything module-specific lands in
/// `options` and is decoded by the module into its own struct via
/// [`ModuleConfig::options_as`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Instance name override (defaults to the factory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Update interval in milliseconds (Periodic modules only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval_ms: Option<u64>,
    /// Override of the module's declared update mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
    /// Inline CSS applied to the module's widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,
    /// Extra CSS classes for the module's widget
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css_classes: Vec<String>,
    /// Module-specific options
    #[serde(flatten)]
    pub options: HashMap<String, Value>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.update_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = Some(mode);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Configured interval, if any
    pub fn interval(&self) -> Option<Duration> {
        self.update_interval_ms.map(Duration::from_millis)
    }

    /// Check the conventional keys
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_ms == Some(0) {
            return Err(ConfigError::ZeroInterval);
        }
        if matches!(self.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }

    /// Decode the module-specific options into a typed struct
    ///
    /// Missing keys fall back to the struct's serde defaults.
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let map: serde_json::Map<String, Value> = self
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(map))
            .map_err(|e| ConfigError::InvalidOptions(e.to_string()))
    }
}
