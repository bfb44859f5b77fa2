//! Static text module
//!
//! Shows a fixed label. Never updated after its widget is built.

use anyhow::Result;
use rg_bar_core::{Module, ModuleBase};
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticTextOptions {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tooltip: Option<String>,
}

pub struct StaticTextModule {
    base: ModuleBase,
    options: StaticTextOptions,
}

impl StaticTextModule {
    pub fn new() -> Self {
        Self {
            base: ModuleBase::new("static_text", UpdateMode::Static),
            options: StaticTextOptions::default(),
        }
    }
}

impl Default for StaticTextModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for StaticTextModule {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn update_mode(&self) -> UpdateMode {
        self.base.mode()
    }

    fn create_widget(&mut self) -> Result<WidgetHandle> {
        let widget = self.base.new_widget();
        self.update_widget(&widget)?;
        Ok(widget)
    }

    fn update_widget(&mut self, widget: &WidgetHandle) -> Result<()> {
        let text = self.options.text.clone();
        let tooltip = self.options.tooltip.clone();
        widget.update(|state| {
            state.visible = !text.is_empty();
            state.text = text;
            state.tooltip = tooltip;
        });
        Ok(())
    }

    fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        self.options = config.options_as()?;
        if self.options.text.is_empty() {
            log::warn!("static_text module has no text configured");
        }
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
