//! CPU usage module

use anyhow::Result;
use rg_bar_core::{Module, ModuleBase};
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

fn default_format() -> String {
    "CPU {usage}%".to_string()
}

fn default_warning_threshold() -> f32 {
    80.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuOptions {
    /// `{usage}` is replaced with the overall usage in percent
    #[serde(default = "default_format")]
    pub format: String,
    /// Usage at or above this adds the `warning` css class
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f32,
    /// List per-core usage in the tooltip
    #[serde(default)]
    pub per_core_tooltip: bool,
}

impl Default for CpuOptions {
    fn default() -> Self {
        Self {
            format: default_format(),
            warning_threshold: default_warning_threshold(),
            per_core_tooltip: false,
        }
    }
}

/// Substitute usage into a format string
pub fn format_usage(format: &str, usage: f32) -> String {
    format.replace("{usage}", &format!("{:.0}", usage))
}

/// Overall CPU usage, refreshed on every update
pub struct CpuModule {
    base: ModuleBase,
    options: CpuOptions,
    system: System,
}

impl CpuModule {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        Self {
            base: ModuleBase::new("cpu", UpdateMode::Periodic).with_interval(Duration::from_secs(2)),
            options: CpuOptions::default(),
            system,
        }
    }

    fn classes_for(&self, usage: f32) -> Vec<String> {
        let mut classes = self.base.widget_classes();
        if usage >= self.options.warning_threshold {
            classes.push("warning".to_string());
        }
        classes
    }

    fn tooltip(&self) -> Option<String> {
        if !self.options.per_core_tooltip {
            return None;
        }
        let lines: Vec<String> = self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(i, cpu)| format!("Core {}: {:.0}%", i, cpu.cpu_usage()))
            .collect();
        Some(lines.join("\n"))
    }
}

impl Default for CpuModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for CpuModule {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_mode(&self) -> UpdateMode {
        self.base.mode()
    }

    fn update_interval(&self) -> Duration {
        self.base.interval()
    }

    fn create_widget(&mut self) -> Result<WidgetHandle> {
        let widget = self.base.new_widget();
        widget.set_text(format_usage(&self.options.format, 0.0));
        Ok(widget)
    }

    fn update_widget(&mut self, widget: &WidgetHandle) -> Result<()> {
        self.system.refresh_cpu_all();
        let usage = self.system.global_cpu_usage();
        let text = format_usage(&self.options.format, usage);
        let classes = self.classes_for(usage);
        let tooltip = self.tooltip();
        widget.update(|state| {
            state.text = text;
            state.css_classes = classes;
            state.tooltip = tooltip;
        });
        Ok(())
    }

    fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        self.options = config.options_as()?;
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
}
