//! Update strategies a module can declare

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a module's displayed content is refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// Never refreshed after the widget is created
    Static,
    /// Refreshed on a fixed cadence
    Periodic,
    /// Refreshed whenever one of the module's listeners fires
    EventDriven,
    /// Refreshed only on an explicit trigger (e.g. an inbound message)
    OnDemand,
}

/// Returned when a string does not name a known update mode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported update mode: {0}")]
pub struct UnsupportedModeError(pub String);

impl UpdateMode {
    pub const ALL: [UpdateMode; 4] = [
        UpdateMode::Static,
        UpdateMode::Periodic,
        UpdateMode::EventDriven,
        UpdateMode::OnDemand,
    ];

    /// Stable identifier used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Static => "static",
            UpdateMode::Periodic => "periodic",
            UpdateMode::EventDriven => "event_driven",
            UpdateMode::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = UnsupportedModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "static" => Ok(UpdateMode::Static),
            "periodic" => Ok(UpdateMode::Periodic),
            "event_driven" | "eventdriven" | "event" => Ok(UpdateMode::EventDriven),
            "on_demand" | "ondemand" | "manual" => Ok(UpdateMode::OnDemand),
            _ => Err(UnsupportedModeError(s.to_string())),
        }
    }
}

impl Serialize for UpdateMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
