//! Bar facade
//!
//! Owns the module registry and the update scheduler and walks a module
//! through its whole life: create, register, build its widget, schedule, and
//! the reverse on removal.

use crate::config::ModuleEntry;
use crate::core::UpdateScheduler;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rg_bar_core::{ModuleConfig, ModuleRegistry, UiDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub struct Bar {
    registry: Arc<ModuleRegistry>,
    scheduler: Arc<UpdateScheduler>,
}

impl Bar {
    /// Create a bar whose background work runs on `runtime`
    ///
    /// Starts the Periodic sweep unless `sweep` is `None`.
    pub fn new(ui: UiDispatcher, runtime: Handle, sweep: Option<Duration>) -> Self {
        let registry = Arc::new(ModuleRegistry::new(ui));
        let scheduler = Arc::new(
            UpdateScheduler::new(Arc::clone(&registry), runtime).with_sweep_interval(sweep),
        );
        scheduler.start();
        Self {
            registry,
            scheduler,
        }
    }

    /// Register the factories shipped with rg-bar
    pub fn register_builtin_factories(&self) -> Result<()> {
        rg_bar_modules::register_all(&self.registry)
            .context("Failed to register built-in modules")
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<UpdateScheduler> {
        &self.scheduler
    }

    /// Build a module from `factory`, show its widget and start updating it
    ///
    /// Returns the module's name. Nothing is left behind on failure.
    pub async fn add_module(&self, factory: &str, config: &ModuleConfig) -> Result<String> {
        let module = self.registry.create_module(factory, config)?;
        let name = module.name().to_string();
        self.registry.register_module(module)?;

        let widget = match self.registry.create_module_widget(&name).await {
            Ok(widget) => widget,
            Err(e) => {
                self.discard(&name);
                return Err(e).with_context(|| format!("Failed to create widget for {}", name));
            }
        };

        if let Err(e) = self.scheduler.schedule_module(&name, widget.clone()) {
            self.release_widget(widget).await;
            self.discard(&name);
            return Err(e).with_context(|| format!("Failed to schedule {}", name));
        }

        info!("Added module {} ({})", name, factory);
        Ok(name)
    }

    /// Add every configured module in order; returns how many were added
    ///
    /// A module that fails to load is logged and skipped.
    pub async fn load_modules(&self, entries: &[ModuleEntry]) -> usize {
        let mut added = 0;
        for entry in entries {
            match self.add_module(&entry.module, &entry.config).await {
                Ok(_) => added += 1,
                Err(e) => warn!("Skipping module {}: {:#}", entry.module, e),
            }
        }
        added
    }

    /// Stop updating a module, clean it up and drop its widget
    pub async fn remove_module(&self, name: &str) -> Result<()> {
        let widget = self.scheduler.widget(name);
        if let Err(e) = self.scheduler.unschedule_module(name) {
            debug!("Module {} was not scheduled: {}", name, e);
        }
        self.registry.unregister_module(name)?;
        if let Some(widget) = widget {
            self.release_widget(widget).await;
        }
        info!("Removed module {}", name);
        Ok(())
    }

    /// Route an inbound message; true if a module claimed it
    pub async fn handle_ipc(&self, message: &str) -> bool {
        self.scheduler.handle_ipc_message(message).await
    }

    /// Forward a click on the named module's widget
    pub fn handle_click(&self, name: &str) -> bool {
        self.scheduler.handle_click(name)
    }

    /// Names of the registered modules in display order
    pub fn module_names(&self) -> Vec<String> {
        self.registry.module_names()
    }

    /// Stylesheets contributed by the registered modules, in display order
    pub fn module_styles(&self) -> Vec<String> {
        self.registry
            .module_names()
            .iter()
            .filter_map(|name| {
                self.registry
                    .with_module(name, |module| module.styles().map(str::to_string))
                    .ok()
                    .flatten()
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn discard(&self, name: &str) {
        if let Err(e) = self.registry.unregister_module(name) {
            warn!("Failed to discard module {}: {}", name, e);
        }
    }

    async fn release_widget(&self, widget: rg_bar_core::WidgetHandle) {
        let released = self
            .registry
            .dispatcher()
            .invoke(move |ctx| ctx.release(&widget))
            .await;
        if let Err(e) = released {
            debug!("Widget release skipped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_bar_core::{ui_channel, UiLoop, WidgetHandle, WidgetRenderer};
    use std::sync::Mutex;
    use tokio::task::LocalSet;

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl WidgetRenderer for Journal {
        fn realize(&mut self, widget: &WidgetHandle) {
            self.0.lock().unwrap().push(format!("realize {}", widget.owner()));
        }

        fn render(&mut self, widget: &WidgetHandle) {
            self.0.lock().unwrap().push(format!("render {}", widget.owner()));
        }

        fn release(&mut self, widget: &WidgetHandle) {
            self.0.lock().unwrap().push(format!("release {}", widget.owner()));
        }
    }

    fn bar_with_journal() -> (Bar, UiLoop, Journal) {
        let journal = Journal::default();
        let (ui, ui_loop) = ui_channel();
        let ui_loop = ui_loop.with_renderer(Box::new(journal.clone()));
        let bar = Bar::new(ui, Handle::current(), None);
        bar.register_builtin_factories().unwrap();
        (bar, ui_loop, journal)
    }

    #[tokio::test]
    async fn test_add_and_remove_module() {
        let (bar, ui_loop, journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let config = ModuleConfig::new()
                    .with_name("greeting")
                    .with_option("text", "hello");
                let name = bar.add_module("static_text", &config).await.unwrap();
                assert_eq!(name, "greeting");
                assert_eq!(bar.module_names(), vec!["greeting".to_string()]);
                assert_eq!(
                    bar.scheduler().widget("greeting").map(|w| w.text()),
                    Some("hello".to_string())
                );

                bar.remove_module("greeting").await.unwrap();
                assert!(bar.module_names().is_empty());
                assert!(!bar.scheduler().is_scheduled("greeting"));
                assert_eq!(
                    journal.entries(),
                    vec!["realize greeting".to_string(), "release greeting".to_string()]
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_failed_module_leaves_nothing_behind() {
        let (bar, ui_loop, _journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                assert!(bar.add_module("socket_feed", &ModuleConfig::new()).await.is_err());
                assert!(bar.add_module("weather", &ModuleConfig::new()).await.is_err());
                assert_eq!(bar.registry().module_count(), 0);
                assert_eq!(bar.scheduler().scheduled_count(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_duplicate_name_keeps_first_module() {
        let (bar, ui_loop, _journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let config = ModuleConfig::new().with_option("text", "a");
                bar.add_module("static_text", &config).await.unwrap();
                assert!(bar.add_module("static_text", &config).await.is_err());
                assert!(bar.scheduler().is_scheduled("static_text"));
                assert_eq!(bar.registry().module_count(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_load_modules_skips_broken_entries() {
        let (bar, ui_loop, _journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let entries = vec![
                    ModuleEntry::new("message"),
                    ModuleEntry::new("socket_feed"),
                    ModuleEntry::new("static_text")
                        .with_config(ModuleConfig::new().with_option("text", "|")),
                ];
                assert_eq!(bar.load_modules(&entries).await, 2);
                assert_eq!(
                    bar.module_names(),
                    vec!["message".to_string(), "static_text".to_string()]
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_message_updates_on_demand_module() {
        let (bar, ui_loop, journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                bar.add_module("message", &ModuleConfig::new()).await.unwrap();
                assert!(bar.handle_ipc("text: build green ").await);
                assert!(!bar.handle_ipc("volume:up").await);

                let widget = bar.scheduler().widget("message").unwrap();
                assert_eq!(widget.text(), "build green");
                assert!(journal.entries().contains(&"render message".to_string()));
            })
            .await;
    }

    #[tokio::test]
    async fn test_module_styles_follow_display_order() {
        let (bar, ui_loop, _journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let mut styled = ModuleConfig::new().with_option("text", "x");
                styled.styles = Some("label.static_text { color: red; }".to_string());
                bar.add_module("message", &ModuleConfig::new()).await.unwrap();
                bar.add_module("static_text", &styled).await.unwrap();
                assert_eq!(
                    bar.module_styles(),
                    vec!["label.static_text { color: red; }".to_string()]
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_modules() {
        let (bar, ui_loop, _journal) = bar_with_journal();
        let local = LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                bar.add_module("message", &ModuleConfig::new()).await.unwrap();
                bar.shutdown();
                assert_eq!(bar.registry().module_count(), 0);
                assert!(bar.scheduler().is_shut_down());
                assert!(bar.add_module("message", &ModuleConfig::new()).await.is_err());
                assert_eq!(bar.registry().module_count(), 0);
            })
            .await;
    }
}
