//! Clock module
//!
//! Periodic. Renders the current time with a strftime format in the local
//! zone or any IANA timezone. Clicking toggles the alternate format.

use anyhow::{bail, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use rg_bar_core::{Clickable, Module, ModuleBase};
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use serde::{Deserialize, Serialize};

fn default_format() -> String {
    "%H:%M".to_string()
}

fn default_timezone() -> String {
    "Local".to_string()
}

fn default_tooltip_format() -> Option<String> {
    Some("%A, %d %B %Y".to_string())
}

/// Options recognised by the clock module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockOptions {
    #[serde(default = "default_format")]
    pub format: String,
    /// Shown instead of `format` after a click
    #[serde(default)]
    pub alt_format: Option<String>,
    #[serde(default = "default_tooltip_format")]
    pub tooltip_format: Option<String>,
    /// "Local" or an IANA name such as "Europe/Berlin"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            format: default_format(),
            alt_format: None,
            tooltip_format: default_tooltip_format(),
            timezone: default_timezone(),
        }
    }
}

fn check_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("invalid time format: {}", format);
    }
    Ok(())
}

pub struct ClockModule {
    base: ModuleBase,
    options: ClockOptions,
    timezone: Option<Tz>,
    show_alt: bool,
}

impl ClockModule {
    pub fn new() -> Self {
        Self {
            base: ModuleBase::new("clock", UpdateMode::Periodic),
            options: ClockOptions::default(),
            timezone: None,
            show_alt: false,
        }
    }

    pub fn options(&self) -> &ClockOptions {
        &self.options
    }

    fn active_format(&self) -> &str {
        match (&self.options.alt_format, self.show_alt) {
            (Some(alt), true) => alt,
            _ => &self.options.format,
        }
    }

    fn format_in_zone(&self, at: DateTime<Utc>, format: &str) -> String {
        match self.timezone {
            Some(tz) => at.with_timezone(&tz).format(format).to_string(),
            None => at.with_timezone(&Local).format(format).to_string(),
        }
    }

    /// Widget text and tooltip for the given instant
    pub fn render_at(&self, at: DateTime<Utc>) -> (String, Option<String>) {
        let text = self.format_in_zone(at, self.active_format());
        let tooltip = self
            .options
            .tooltip_format
            .as_deref()
            .map(|format| self.format_in_zone(at, format));
        (text, tooltip)
    }
}

impl Default for ClockModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ClockModule {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_mode(&self) -> UpdateMode {
        self.base.mode()
    }

    fn update_interval(&self) -> std::time::Duration {
        self.base.interval()
    }

    fn create_widget(&mut self) -> Result<WidgetHandle> {
        let widget = self.base.new_widget();
        self.update_widget(&widget)?;
        Ok(widget)
    }

    fn update_widget(&mut self, widget: &WidgetHandle) -> Result<()> {
        let (text, tooltip) = self.render_at(Utc::now());
        widget.update(|state| {
            state.text = text;
            state.tooltip = tooltip;
        });
        Ok(())
    }

    fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        let options: ClockOptions = config.options_as()?;
        check_format(&options.format)?;
        if let Some(alt) = &options.alt_format {
            check_format(alt)?;
        }
        if let Some(tooltip) = &options.tooltip_format {
            check_format(tooltip)?;
        }

        self.timezone = if options.timezone == "Local" {
            None
        } else {
            match options.timezone.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    log::warn!(
                        "Unknown timezone '{}' for clock, using local time",
                        options.timezone
                    );
                    None
                }
            }
        };
        self.options = options;
        self.base.initialize(config)
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    fn styles(&self) -> Option<&str> {
        self.base.styles()
    }

    fn css_classes(&self) -> &[String] {
        self.base.css_classes()
    }

    fn as_clickable(&mut self) -> Option<&mut dyn Clickable> {
        Some(self)
    }
}

impl Clickable for ClockModule {
    fn handle_click(&mut self, _widget: &WidgetHandle) -> bool {
        if self.options.alt_format.is_none() {
            return false;
        }
        self.show_alt = !self.show_alt;
        true
    }
}
