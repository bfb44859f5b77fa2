//! Message module
//!
//! OnDemand. Displays text pushed by inbound messages carrying its prefix
//! (`text:hello` shows "hello"); a click clears it.

use anyhow::{bail, Result};
use rg_bar_core::{Clickable, IpcHandler, Module, ModuleBase};
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use serde::{Deserialize, Serialize};

fn default_prefix() -> String {
    "text:".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Shown while no message is set; the widget hides when both are empty
    #[serde(default)]
    pub placeholder: String,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            placeholder: String::new(),
        }
    }
}

pub struct MessageModule {
    base: ModuleBase,
    options: MessageOptions,
    current: String,
}

impl MessageModule {
    pub fn new() -> Self {
        Self {
            base: ModuleBase::new("message", UpdateMode::OnDemand),
            options: MessageOptions::default(),
            current: String::new(),
        }
    }

    /// The message currently shown, if any
    pub fn current(&self) -> &str {
        &self.current
    }
}

impl Default for MessageModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for MessageModule {
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
        let text = if self.current.is_empty() {
            self.options.placeholder.clone()
        } else {
            self.current.clone()
        };
        widget.update(|state| {
            state.visible = !text.is_empty();
            state.text = text;
        });
        Ok(())
    }

    fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        let options: MessageOptions = config.options_as()?;
        if options.prefix.is_empty() {
            bail!("message prefix must not be empty");
        }
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

    fn as_ipc_handler(&mut self) -> Option<&mut dyn IpcHandler> {
        Some(self)
    }
}

impl IpcHandler for MessageModule {
    fn handle_ipc(&mut self, message: &str) -> bool {
        match message.strip_prefix(self.options.prefix.as_str()) {
            Some(rest) => {
                self.current = rest.trim().to_string();
                true
            }
            None => false,
        }
    }
}

impl Clickable for MessageModule {
    fn handle_click(&mut self, _widget: &WidgetHandle) -> bool {
        if self.current.is_empty() {
            return false;
        }
        self.current.clear();
        true
    }
}
