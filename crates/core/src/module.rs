//! Module trait and related types

use crate::constants::DEFAULT_UPDATE_INTERVAL;
use crate::listener::SharedListener;
use anyhow::Result;
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use std::time::Duration;

/// Trait for all status bar modules
///
/// A module owns the logic behind one status item (clock, battery, ...).
/// Widget methods are only ever called on the UI thread through the
/// registry's UI queue.
///
/// Optional capabilities are exposed through the `as_*` accessors rather than
/// stub methods: a module that cannot be clicked simply keeps the default
/// `as_clickable` returning `None`.
pub trait Module: Send {
    /// Unique name of this module instance
    fn name(&self) -> &str;

    /// Update strategy this module wants
    fn update_mode(&self) -> UpdateMode;

    /// Update cadence (only meaningful for Periodic modules)
    fn update_interval(&self) -> Duration {
        DEFAULT_UPDATE_INTERVAL
    }

    /// Build the widget representation
    ///
    /// Called once, on the UI thread.
    fn create_widget(&mut self) -> Result<WidgetHandle>;

    /// Refresh the widget in place
    fn update_widget(&mut self, widget: &WidgetHandle) -> Result<()>;

    /// One-time configuration
    fn initialize(&mut self, config: &ModuleConfig) -> Result<()>;

    /// Whether `initialize` has succeeded
    fn is_initialized(&self) -> bool;

    /// Release listeners and any other resources held by the module
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Inline CSS for this module's widget
    fn styles(&self) -> Option<&str> {
        None
    }

    /// Extra CSS classes for this module's widget
    fn css_classes(&self) -> &[String] {
        &[]
    }

    /// Click capability
    fn as_clickable(&mut self) -> Option<&mut dyn Clickable> {
        None
    }

    /// Inbound message capability
    fn as_ipc_handler(&mut self) -> Option<&mut dyn IpcHandler> {
        None
    }

    /// Listener provisioning capability
    fn as_event_source(&mut self) -> Option<&mut dyn EventSource> {
        None
    }
}

/// Modules that react to clicks on their widget
pub trait Clickable {
    /// Returns true if the click was consumed
    fn handle_click(&mut self, widget: &WidgetHandle) -> bool;
}

/// Modules that accept inbound messages
pub trait IpcHandler {
    /// Returns true if this module claims the message
    fn handle_ipc(&mut self, message: &str) -> bool;
}

/// Modules that declare their own event listeners
pub trait EventSource {
    /// Build the listeners this module needs
    ///
    /// The registry takes ownership of the returned set and starts/stops it.
    fn setup_event_listeners(&mut self) -> Result<Vec<SharedListener>>;
}

/// Whether the module exposes the click capability
pub fn handles_clicks(module: &mut dyn Module) -> bool {
    module.as_clickable().is_some()
}

/// Whether the module exposes the inbound message capability
pub fn handles_ipc(module: &mut dyn Module) -> bool {
    module.as_ipc_handler().is_some()
}

/// Type-erased module for dynamic dispatch
pub type BoxedModule = Box<dyn Module>;

/// Produces modules from configuration
pub trait ModuleFactory: Send + Sync {
    /// Name this factory is registered under
    fn module_name(&self) -> &str;

    /// Build a module instance
    fn create_module(&self, config: &ModuleConfig) -> Result<BoxedModule>;

    /// Configuration used when a module is registered uninitialized
    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
    }

    /// Names of modules this one expects to be registered first
    ///
    /// Advisory only, nothing resolves this.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

type CreateFn = dyn Fn(&ModuleConfig) -> Result<BoxedModule> + Send + Sync;

/// Factory built from a closure
pub struct FnFactory {
    name: String,
    create: Box<CreateFn>,
    default_config: ModuleConfig,
    dependencies: Vec<String>,
}

impl FnFactory {
    pub fn new<F>(name: &str, create: F) -> Self
    where
        F: Fn(&ModuleConfig) -> Result<BoxedModule> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            create: Box::new(create),
            default_config: ModuleConfig::default(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_default_config(mut self, config: ModuleConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

impl ModuleFactory for FnFactory {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn create_module(&self, config: &ModuleConfig) -> Result<BoxedModule> {
        (self.create)(config)
    }

    fn default_config(&self) -> ModuleConfig {
        self.default_config.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }
}

/// Common state most modules embed
///
/// Handles the conventional `interval`, `styles`, `css_classes` and mode
/// override keys plus the initialized flag.
#[derive(Debug, Clone)]
pub struct ModuleBase {
    name: String,
    mode: UpdateMode,
    interval: Duration,
    styles: Option<String>,
    css_classes: Vec<String>,
    initialized: bool,
}

impl ModuleBase {
    pub fn new(name: &str, mode: UpdateMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            interval: DEFAULT_UPDATE_INTERVAL,
            styles: None,
            css_classes: Vec::new(),
            initialized: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Apply the conventional keys and mark the module initialized
    pub fn initialize(&mut self, config: &ModuleConfig) -> Result<()> {
        config.validate()?;
        if let Some(name) = &config.name {
            self.name = name.clone();
        }
        if let Some(interval) = config.interval() {
            self.interval = interval;
        }
        if let Some(mode) = config.update_mode {
            self.mode = mode;
        }
        if config.styles.is_some() {
            self.styles = config.styles.clone();
        }
        if !config.css_classes.is_empty() {
            self.css_classes = config.css_classes.clone();
        }
        self.initialized = true;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn styles(&self) -> Option<&str> {
        self.styles.as_deref()
    }

    pub fn css_classes(&self) -> &[String] {
        &self.css_classes
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `module`, the module name, then the configured extra classes
    pub fn widget_classes(&self) -> Vec<String> {
        let mut classes = vec!["module".to_string(), self.name.clone()];
        classes.extend(self.css_classes.iter().cloned());
        classes
    }

    /// Allocate a widget handle carrying the base css classes
    pub fn new_widget(&self) -> WidgetHandle {
        let widget = WidgetHandle::new(&self.name);
        widget.set_css_classes(&self.widget_classes());
        widget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_base_applies_conventional_keys() {
        let mut base = ModuleBase::new("clock", UpdateMode::Periodic);
        assert!(!base.is_initialized());

        let config = ModuleConfig {
            styles: Some("color: red;".to_string()),
            css_classes: vec!["accent".to_string()],
            ..ModuleConfig::default()
        }
        .with_interval(Duration::from_millis(250));

        base.initialize(&config).unwrap();

        assert!(base.is_initialized());
        assert_eq!(base.interval(), Duration::from_millis(250));
        assert_eq!(base.styles(), Some("color: red;"));
        assert_eq!(base.css_classes(), ["accent".to_string()]);
    }

    #[test]
    fn test_module_base_rejects_invalid_config() {
        let mut base = ModuleBase::new("clock", UpdateMode::Periodic);
        let config = ModuleConfig::new().with_interval(Duration::ZERO);
        assert!(base.initialize(&config).is_err());
        assert!(!base.is_initialized());
    }

    #[test]
    fn test_new_widget_carries_classes() {
        let mut base = ModuleBase::new("cpu", UpdateMode::Periodic);
        base.initialize(&ModuleConfig {
            css_classes: vec!["warn".to_string()],
            ..ModuleConfig::default()
        })
        .unwrap();
        let widget = base.new_widget();
        assert_eq!(widget.owner(), "cpu");
        assert_eq!(
            widget.snapshot().css_classes,
            vec!["module".to_string(), "cpu".to_string(), "warn".to_string()]
        );
    }

    #[test]
    fn test_fn_factory_exposes_metadata() {
        let factory = FnFactory::new("static", |_| anyhow::bail!("not needed"))
            .with_default_config(ModuleConfig::new().with_name("static-default"))
            .with_dependencies(&["clock"]);
        assert_eq!(factory.module_name(), "static");
        assert_eq!(factory.default_config().name.as_deref(), Some("static-default"));
        assert_eq!(factory.dependencies(), vec!["clock".to_string()]);
        assert!(factory.create_module(&ModuleConfig::default()).is_err());
    }
}
