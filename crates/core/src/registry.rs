//! Registry of module factories and live module instances
//!
//! The registry is constructed explicitly and shared by reference (usually
//! behind an `Arc`). All state lives under one lock; module instances are
//! handed out as `Arc<Mutex<..>>` so callers never hold the registry lock
//! while talking to a module or waiting on the UI thread.

use crate::constants::CLICKABLE_CLASS;
use crate::error::{RegistryError, Result};
use crate::listener::{ListenerCallback, SharedListener};
use crate::module::{handles_clicks, handles_ipc, BoxedModule, Module, ModuleFactory};
use crate::ui_queue::UiDispatcher;
use log::{debug, error, info, warn};
use rg_bar_types::{ModuleConfig, UpdateMode, WidgetHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A live module instance, shareable across threads
pub type SharedModule = Arc<Mutex<BoxedModule>>;

#[derive(Default)]
struct RegistryState {
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
    modules: HashMap<String, SharedModule>,
    /// Registration order of `modules`
    order: Vec<String>,
    /// Every key here is also a key of `modules`
    listeners: HashMap<String, Vec<SharedListener>>,
}

/// Lock a module, recovering from a panic in an earlier call
pub(crate) fn lock_module(module: &SharedModule) -> MutexGuard<'_, BoxedModule> {
    module.lock().unwrap_or_else(|poisoned| {
        warn!("Module lock poisoned by an earlier panic, recovering");
        poisoned.into_inner()
    })
}

fn stop_listeners(name: &str, listeners: &[SharedListener]) {
    for listener in listeners {
        listener.stop();
        if let Err(e) = listener.cleanup() {
            warn!(
                "Cleanup of listener {} for module {} failed: {}",
                listener.name(),
                name,
                e
            );
        }
    }
}

/// Factories and module instances
pub struct ModuleRegistry {
    state: RwLock<RegistryState>,
    ui: UiDispatcher,
}

impl ModuleRegistry {
    /// Create an empty registry that marshals widget work through `ui`
    pub fn new(ui: UiDispatcher) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            ui,
        }
    }

    pub fn dispatcher(&self) -> &UiDispatcher {
        &self.ui
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|_| RegistryError::LockPoisoned("module registry".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| RegistryError::LockPoisoned("module registry".to_string()))
    }

    /// Look up a live module
    pub fn module(&self, name: &str) -> Result<SharedModule> {
        self.read()?
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ModuleNotFound(name.to_string()))
    }

    fn factory(&self, name: &str) -> Result<Arc<dyn ModuleFactory>> {
        self.read()?
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFactory(name.to_string()))
    }

    // ---- factories ----

    /// Make a factory available to [`create_module`](Self::create_module)
    pub fn register_factory<F>(&self, factory: F) -> Result<()>
    where
        F: ModuleFactory + 'static,
    {
        let name = factory.module_name().to_string();
        let mut state = self.write()?;
        if state.factories.contains_key(&name) {
            return Err(RegistryError::DuplicateFactory(name));
        }
        state.factories.insert(name.clone(), Arc::new(factory));
        debug!("Registered module factory: {}", name);
        Ok(())
    }

    /// Registered factory names, sorted
    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.read() {
            Ok(state) => state.factories.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn factory_count(&self) -> usize {
        self.read().map(|s| s.factories.len()).unwrap_or(0)
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.read()
            .map(|s| s.factories.contains_key(name))
            .unwrap_or(false)
    }

    /// Default configuration of a factory
    pub fn default_config(&self, factory: &str) -> Result<ModuleConfig> {
        Ok(self.factory(factory)?.default_config())
    }

    /// Declared (not enforced) dependencies of a factory
    pub fn dependencies(&self, factory: &str) -> Result<Vec<String>> {
        Ok(self.factory(factory)?.dependencies())
    }

    /// Build a module through the named factory
    ///
    /// The config is validated first. The returned module is not registered.
    pub fn create_module(&self, factory_name: &str, config: &ModuleConfig) -> Result<BoxedModule> {
        let factory = self.factory(factory_name)?;
        config.validate().map_err(|source| RegistryError::InvalidConfig {
            name: factory_name.to_string(),
            source,
        })?;
        factory
            .create_module(config)
            .map_err(|source| RegistryError::Factory {
                name: factory_name.to_string(),
                source,
            })
    }

    // ---- modules ----

    /// Store a module instance
    ///
    /// A module that is not initialized yet gets initialized with the default
    /// config of the factory sharing its name (or an empty config).
    pub fn register_module(&self, mut module: BoxedModule) -> Result<()> {
        let name = module.name().to_string();
        if self.has_module(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }

        if !module.is_initialized() {
            let config = match self.factory(&name) {
                Ok(factory) => factory.default_config(),
                Err(_) => ModuleConfig::default(),
            };
            module
                .initialize(&config)
                .map_err(|source| RegistryError::Initialization {
                    name: name.clone(),
                    source,
                })?;
        }

        // Initialization may have applied an instance name override
        let name = module.name().to_string();
        let mut state = self.write()?;
        if state.modules.contains_key(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        state.modules.insert(name.clone(), Arc::new(Mutex::new(module)));
        state.order.push(name.clone());
        info!("Registered module: {}", name);
        Ok(())
    }

    /// Remove a module, releasing its listeners and resources
    ///
    /// Cleanup failures are logged; the entry is removed regardless.
    pub fn unregister_module(&self, name: &str) -> Result<()> {
        let (module, listeners) = {
            let mut state = self.write()?;
            let module = state
                .modules
                .remove(name)
                .ok_or_else(|| RegistryError::ModuleNotFound(name.to_string()))?;
            state.order.retain(|n| n != name);
            (module, state.listeners.remove(name).unwrap_or_default())
        };

        stop_listeners(name, &listeners);
        if let Err(e) = lock_module(&module).cleanup() {
            warn!("Cleanup of module {} failed: {}", name, e);
        }
        info!("Unregistered module: {}", name);
        Ok(())
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.read()
            .map(|s| s.modules.contains_key(name))
            .unwrap_or(false)
    }

    /// Live module names in registration order
    pub fn module_names(&self) -> Vec<String> {
        self.read().map(|s| s.order.clone()).unwrap_or_default()
    }

    pub fn module_count(&self) -> usize {
        self.read().map(|s| s.modules.len()).unwrap_or(0)
    }

    /// Run `f` against a module while holding only that module's lock
    pub fn with_module<R>(&self, name: &str, f: impl FnOnce(&mut dyn Module) -> R) -> Result<R> {
        let module = self.module(name)?;
        let mut guard = lock_module(&module);
        Ok(f(&mut **guard))
    }

    pub fn module_mode(&self, name: &str) -> Result<UpdateMode> {
        self.with_module(name, |m| m.update_mode())
    }

    pub fn module_interval(&self, name: &str) -> Result<Duration> {
        self.with_module(name, |m| m.update_interval())
    }

    // ---- listeners ----

    /// Ask the module for its listeners and take ownership of them
    ///
    /// Returns the number of listeners now held for the module. A module
    /// without the event-source capability yields zero. Listeners from an
    /// earlier setup are stopped and replaced.
    pub fn setup_module_listeners(&self, name: &str) -> Result<usize> {
        let module = self.module(name)?;
        let listeners = {
            let mut guard = lock_module(&module);
            match guard.as_event_source() {
                Some(source) => {
                    source
                        .setup_event_listeners()
                        .map_err(|source| RegistryError::Module {
                            name: name.to_string(),
                            source,
                        })?
                }
                None => Vec::new(),
            }
        };

        let count = listeners.len();
        let previous = {
            let mut state = self.write()?;
            if !state.modules.contains_key(name) {
                drop(state);
                stop_listeners(name, &listeners);
                return Err(RegistryError::ModuleNotFound(name.to_string()));
            }
            if listeners.is_empty() {
                state.listeners.remove(name)
            } else {
                state.listeners.insert(name.to_string(), listeners)
            }
        };
        if let Some(previous) = previous {
            stop_listeners(name, &previous);
        }
        debug!("Module {} has {} listener(s)", name, count);
        Ok(count)
    }

    fn listeners_of(&self, name: &str) -> Result<Vec<SharedListener>> {
        let state = self.read()?;
        if !state.modules.contains_key(name) {
            return Err(RegistryError::ModuleNotFound(name.to_string()));
        }
        Ok(state.listeners.get(name).cloned().unwrap_or_default())
    }

    /// Start every listener held for the module
    ///
    /// A listener that is already running makes this fail.
    pub fn start_module_listeners(&self, name: &str, callback: ListenerCallback) -> Result<()> {
        for listener in self.listeners_of(name)? {
            listener
                .start(Arc::clone(&callback))
                .map_err(|source| RegistryError::Listener {
                    name: name.to_string(),
                    source,
                })?;
            debug!("Started listener {} for module {}", listener.name(), name);
        }
        Ok(())
    }

    /// Stop every listener held for the module; they can be started again
    pub fn stop_module_listeners(&self, name: &str) -> Result<()> {
        for listener in self.listeners_of(name)? {
            listener.stop();
        }
        Ok(())
    }

    /// Number of listeners held for the module
    pub fn listener_count(&self, name: &str) -> usize {
        self.read()
            .ok()
            .and_then(|s| s.listeners.get(name).map(Vec::len))
            .unwrap_or(0)
    }

    /// Number of modules holding at least one listener
    pub fn listener_set_count(&self) -> usize {
        self.read().map(|s| s.listeners.len()).unwrap_or(0)
    }

    // ---- UI thread work ----

    /// Have the module build its widget on the UI thread
    pub async fn create_module_widget(&self, name: &str) -> Result<WidgetHandle> {
        let module = self.module(name)?;
        let created = self
            .ui
            .invoke(move |ctx| {
                let mut guard = lock_module(&module);
                let widget = guard.create_widget()?;
                if handles_clicks(&mut **guard) {
                    widget.update(|state| {
                        if !state.css_classes.iter().any(|c| c == CLICKABLE_CLASS) {
                            state.css_classes.push(CLICKABLE_CLASS.to_string());
                        }
                    });
                }
                drop(guard);
                ctx.realize(&widget);
                Ok::<_, anyhow::Error>(widget)
            })
            .await?;
        created.map_err(|source| RegistryError::Module {
            name: name.to_string(),
            source,
        })
    }

    /// Refresh a module's widget on the UI thread, waiting for the result
    ///
    /// This is the only path through which modules mutate widgets.
    pub async fn update_module_widget(&self, name: &str, widget: &WidgetHandle) -> Result<()> {
        let module = self.module(name)?;
        let widget = widget.clone();
        let updated = self
            .ui
            .invoke(move |ctx| {
                lock_module(&module).update_widget(&widget)?;
                ctx.render(&widget);
                Ok::<_, anyhow::Error>(())
            })
            .await?;
        updated.map_err(|source| RegistryError::Module {
            name: name.to_string(),
            source,
        })
    }

    /// Blocking form of [`update_module_widget`](Self::update_module_widget)
    /// for callers on plain threads
    pub fn update_module_widget_blocking(&self, name: &str, widget: &WidgetHandle) -> Result<()> {
        let module = self.module(name)?;
        let widget = widget.clone();
        let updated = self.ui.invoke_blocking(move |ctx| {
            lock_module(&module).update_widget(&widget)?;
            ctx.render(&widget);
            Ok::<_, anyhow::Error>(())
        })?;
        updated.map_err(|source| RegistryError::Module {
            name: name.to_string(),
            source,
        })
    }

    /// Forward a click; false if the module is absent or not clickable
    pub fn handle_module_click(&self, name: &str, widget: &WidgetHandle) -> bool {
        let Ok(module) = self.module(name) else {
            return false;
        };
        let mut guard = lock_module(&module);
        match guard.as_clickable() {
            Some(clickable) => clickable.handle_click(widget),
            None => false,
        }
    }

    /// Names of modules able to take inbound messages, in registration order
    pub fn ipc_module_names(&self) -> Vec<String> {
        self.module_names()
            .into_iter()
            .filter(|name| {
                self.with_module(name, |module| handles_ipc(module))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Forward an inbound message; false if the module is absent, lacks the
    /// capability, or does not claim the message
    pub fn handle_module_ipc(&self, name: &str, message: &str) -> bool {
        let Ok(module) = self.module(name) else {
            return false;
        };
        let mut guard = lock_module(&module);
        match guard.as_ipc_handler() {
            Some(handler) => handler.handle_ipc(message),
            None => false,
        }
    }

    /// Stop every listener, then clean up and remove every module
    ///
    /// Returns the number of modules removed.
    pub fn cleanup_all(&self) -> usize {
        // Factories survive a cleanup
        let (mut modules, order, listeners) = {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(poisoned) => {
                    error!("Module registry lock poisoned during cleanup, recovering");
                    poisoned.into_inner()
                }
            };
            (
                std::mem::take(&mut state.modules),
                std::mem::take(&mut state.order),
                std::mem::take(&mut state.listeners),
            )
        };

        for (name, listeners) in &listeners {
            stop_listeners(name, listeners);
        }
        let count = order.len();
        for name in order {
            if let Some(module) = modules.remove(&name) {
                if let Err(e) = lock_module(&module).cleanup() {
                    warn!("Cleanup of module {} failed: {}", name, e);
                }
            }
        }
        info!("Cleaned up {} module(s)", count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerError;
    use crate::listener::{noop_callback, ChannelListener, EventListener};
    use crate::module::{Clickable, EventSource, FnFactory, IpcHandler, ModuleBase};
    use crate::ui_queue::{ui_channel, UiLoop, WidgetRenderer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubModule {
        base: ModuleBase,
        updates: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
        fail_cleanup: bool,
        claims: Option<String>,
        clickable: bool,
        listener: Option<Arc<ChannelListener>>,
    }

    impl StubModule {
        fn new(name: &str) -> Self {
            Self {
                base: ModuleBase::new(name, UpdateMode::Static),
                updates: Arc::new(AtomicUsize::new(0)),
                cleanups: Arc::new(AtomicUsize::new(0)),
                fail_cleanup: false,
                claims: None,
                clickable: true,
                listener: None,
            }
        }
    }

    impl Module for StubModule {
        fn name(&self) -> &str {
            self.base.name()
        }
        fn update_mode(&self) -> UpdateMode {
            self.base.mode()
        }
        fn create_widget(&mut self) -> anyhow::Result<WidgetHandle> {
            Ok(self.base.new_widget())
        }
        fn update_widget(&mut self, widget: &WidgetHandle) -> anyhow::Result<()> {
            let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
            widget.set_text(&format!("update {}", n));
            Ok(())
        }
        fn initialize(&mut self, config: &ModuleConfig) -> anyhow::Result<()> {
            self.base.initialize(config)
        }
        fn is_initialized(&self) -> bool {
            self.base.is_initialized()
        }
        fn cleanup(&mut self) -> anyhow::Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                anyhow::bail!("device busy");
            }
            Ok(())
        }
        fn as_clickable(&mut self) -> Option<&mut dyn Clickable> {
            if self.clickable {
                Some(self)
            } else {
                None
            }
        }
        fn as_ipc_handler(&mut self) -> Option<&mut dyn IpcHandler> {
            if self.claims.is_some() {
                Some(self)
            } else {
                None
            }
        }
        fn as_event_source(&mut self) -> Option<&mut dyn EventSource> {
            if self.listener.is_some() {
                Some(self)
            } else {
                None
            }
        }
    }

    impl Clickable for StubModule {
        fn handle_click(&mut self, _widget: &WidgetHandle) -> bool {
            true
        }
    }

    impl IpcHandler for StubModule {
        fn handle_ipc(&mut self, message: &str) -> bool {
            self.claims.as_deref() == Some(message)
        }
    }

    impl EventSource for StubModule {
        fn setup_event_listeners(&mut self) -> anyhow::Result<Vec<SharedListener>> {
            Ok(self
                .listener
                .iter()
                .map(|l| Arc::clone(l) as SharedListener)
                .collect())
        }
    }

    fn registry() -> (ModuleRegistry, UiLoop) {
        let (ui, ui_loop) = ui_channel();
        (ModuleRegistry::new(ui), ui_loop)
    }

    #[test]
    fn test_duplicate_factory_is_rejected() {
        let (registry, _ui) = registry();
        let make = || FnFactory::new("stub", |_| Ok(Box::new(StubModule::new("stub")) as BoxedModule));

        registry.register_factory(make()).unwrap();
        let err = registry.register_factory(make()).unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateFactory(ref n) if n == "stub"));
        assert_eq!(registry.factory_count(), 1);
    }

    #[test]
    fn test_create_module_errors() {
        let (registry, _ui) = registry();
        registry
            .register_factory(FnFactory::new("broken", |_| anyhow::bail!("no device")))
            .unwrap();

        let err = registry.create_module("missing", &ModuleConfig::default()).err().unwrap();
        assert!(matches!(err, RegistryError::UnknownFactory(_)));

        let err = registry.create_module("broken", &ModuleConfig::default()).err().unwrap();
        assert!(matches!(err, RegistryError::Factory { ref name, .. } if name == "broken"));
        assert!(err.to_string().contains("no device"));

        let zero = ModuleConfig::new().with_interval(Duration::ZERO);
        let err = registry.create_module("broken", &zero).err().unwrap();
        assert!(matches!(err, RegistryError::InvalidConfig { .. }));
    }

    #[test]
    fn test_register_initializes_with_factory_default() {
        let (registry, _ui) = registry();
        registry
            .register_factory(
                FnFactory::new("stub", |_| Ok(Box::new(StubModule::new("stub")) as BoxedModule))
                    .with_default_config(ModuleConfig::new().with_mode(UpdateMode::OnDemand)),
            )
            .unwrap();

        registry.register_module(Box::new(StubModule::new("stub"))).unwrap();
        assert!(registry.with_module("stub", |m| m.is_initialized()).unwrap());
        assert_eq!(registry.module_mode("stub").unwrap(), UpdateMode::OnDemand);

        let err = registry.register_module(Box::new(StubModule::new("stub"))).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateModule(_)));
        assert_eq!(registry.module_count(), 1);
    }

    #[test]
    fn test_unregister_proceeds_when_cleanup_fails() {
        let (registry, _ui) = registry();
        let mut stub = StubModule::new("flaky");
        stub.fail_cleanup = true;
        let cleanups = stub.cleanups.clone();
        registry.register_module(Box::new(stub)).unwrap();

        registry.unregister_module("flaky").unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!registry.has_module("flaky"));
        assert!(registry.module_names().is_empty());
        assert!(matches!(
            registry.unregister_module("flaky"),
            Err(RegistryError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_module_names_keep_registration_order() {
        let (registry, _ui) = registry();
        for name in ["b", "a", "c"] {
            registry.register_module(Box::new(StubModule::new(name))).unwrap();
        }
        registry.unregister_module("a").unwrap();
        registry.register_module(Box::new(StubModule::new("a"))).unwrap();
        assert_eq!(registry.module_names(), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_listener_lifecycle() {
        let (registry, _ui) = registry();
        let mut stub = StubModule::new("feed");
        let listener = Arc::new(ChannelListener::new("feed-channel", Arc::new(|_| {})));
        stub.listener = Some(listener.clone());
        registry.register_module(Box::new(stub)).unwrap();

        assert_eq!(registry.setup_module_listeners("feed").unwrap(), 1);
        registry.start_module_listeners("feed", noop_callback()).unwrap();
        assert!(listener.is_running());

        let err = registry
            .start_module_listeners("feed", noop_callback())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Listener {
                source: ListenerError::AlreadyRunning(_),
                ..
            }
        ));

        registry.stop_module_listeners("feed").unwrap();
        assert!(!listener.is_running());

        registry.start_module_listeners("feed", noop_callback()).unwrap();
        registry.unregister_module("feed").unwrap();
        assert!(!listener.is_running());
        assert_eq!(registry.listener_set_count(), 0);
    }

    #[test]
    fn test_module_without_event_source_has_no_listeners() {
        let (registry, _ui) = registry();
        registry.register_module(Box::new(StubModule::new("plain"))).unwrap();
        assert_eq!(registry.setup_module_listeners("plain").unwrap(), 0);
        assert_eq!(registry.listener_count("plain"), 0);
        assert!(matches!(
            registry.setup_module_listeners("ghost"),
            Err(RegistryError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_ipc_and_click_routing() {
        let (registry, _ui) = registry();
        let mut claiming = StubModule::new("claiming");
        claiming.claims = Some("ping".to_string());
        registry.register_module(Box::new(claiming)).unwrap();
        registry.register_module(Box::new(StubModule::new("deaf"))).unwrap();

        assert!(registry.handle_module_ipc("claiming", "ping"));
        assert!(!registry.handle_module_ipc("claiming", "pong"));
        assert!(!registry.handle_module_ipc("deaf", "ping"));
        assert!(!registry.handle_module_ipc("ghost", "ping"));

        let widget = WidgetHandle::new("deaf");
        assert!(registry.handle_module_click("deaf", &widget));
        assert!(!registry.handle_module_click("ghost", &widget));
    }

    #[test]
    fn test_ipc_module_names_lists_capable_modules_in_order() {
        let (registry, _ui) = registry();
        let mut second = StubModule::new("second");
        second.claims = Some("b".to_string());
        let mut first = StubModule::new("first");
        first.claims = Some("a".to_string());
        registry.register_module(Box::new(first)).unwrap();
        registry.register_module(Box::new(StubModule::new("deaf"))).unwrap();
        registry.register_module(Box::new(second)).unwrap();

        assert_eq!(
            registry.ipc_module_names(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_created_widgets_mark_clickable_modules() {
        let (ui, ui_loop) = ui_channel();
        let registry = ModuleRegistry::new(ui);
        let mut inert = StubModule::new("inert");
        inert.clickable = false;
        registry.register_module(Box::new(inert)).unwrap();
        registry.register_module(Box::new(StubModule::new("button"))).unwrap();

        let local = tokio::task::LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let button = registry.create_module_widget("button").await.unwrap();
                let inert = registry.create_module_widget("inert").await.unwrap();
                assert!(button
                    .snapshot()
                    .css_classes
                    .contains(&CLICKABLE_CLASS.to_string()));
                assert!(!inert
                    .snapshot()
                    .css_classes
                    .contains(&CLICKABLE_CLASS.to_string()));
            })
            .await;
    }

    struct CountingRenderer {
        renders: Arc<AtomicUsize>,
    }

    impl WidgetRenderer for CountingRenderer {
        fn realize(&mut self, _widget: &WidgetHandle) {}
        fn render(&mut self, _widget: &WidgetHandle) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
        fn release(&mut self, _widget: &WidgetHandle) {}
    }

    #[tokio::test]
    async fn test_widget_work_runs_through_ui_loop() {
        let renders = Arc::new(AtomicUsize::new(0));
        let (ui, ui_loop) = ui_channel();
        let ui_loop = ui_loop.with_renderer(Box::new(CountingRenderer {
            renders: renders.clone(),
        }));
        let registry = Arc::new(ModuleRegistry::new(ui));
        registry.register_module(Box::new(StubModule::new("clock"))).unwrap();

        let local = tokio::task::LocalSet::new();
        local.spawn_local(ui_loop.run());
        local
            .run_until(async {
                let widget = registry.create_module_widget("clock").await.unwrap();
                assert_eq!(widget.owner(), "clock");

                registry.update_module_widget("clock", &widget).await.unwrap();
                registry.update_module_widget("clock", &widget).await.unwrap();
                assert_eq!(widget.text(), "update 2");

                let err = registry.update_module_widget("ghost", &widget).await.unwrap_err();
                assert!(matches!(err, RegistryError::ModuleNotFound(_)));
            })
            .await;
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_blocking_update_from_plain_thread() {
        let (ui, mut ui_loop) = ui_channel();
        let registry = Arc::new(ModuleRegistry::new(ui));
        registry.register_module(Box::new(StubModule::new("cpu"))).unwrap();
        let widget = WidgetHandle::new("cpu");

        let worker = {
            let registry = registry.clone();
            let widget = widget.clone();
            std::thread::spawn(move || registry.update_module_widget_blocking("cpu", &widget))
        };
        while ui_loop.run_pending() == 0 {
            std::thread::yield_now();
        }
        worker.join().unwrap().unwrap();
        assert_eq!(widget.text(), "update 1");
    }

    #[tokio::test]
    async fn test_update_fails_when_ui_loop_is_gone() {
        let (registry, ui_loop) = registry();
        registry.register_module(Box::new(StubModule::new("clock"))).unwrap();
        drop(ui_loop);
        let err = registry
            .update_module_widget("clock", &WidgetHandle::new("clock"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Ui(_)));
    }

    #[tokio::test]
    async fn test_cleanup_all_empties_everything_but_factories() {
        let (registry, _ui) = registry();
        registry
            .register_factory(FnFactory::new("stub", |_| Ok(Box::new(StubModule::new("x")) as BoxedModule)))
            .unwrap();
        let mut cleanups = Vec::new();
        for i in 0..5 {
            let mut stub = StubModule::new(&format!("m{}", i));
            stub.listener = Some(Arc::new(ChannelListener::new("c", Arc::new(|_| {}))));
            cleanups.push(stub.cleanups.clone());
            registry.register_module(Box::new(stub)).unwrap();
            registry.setup_module_listeners(&format!("m{}", i)).unwrap();
        }

        assert_eq!(registry.cleanup_all(), 5);
        assert_eq!(registry.module_count(), 0);
        assert_eq!(registry.listener_set_count(), 0);
        assert!(registry.module_names().is_empty());
        assert_eq!(registry.factory_count(), 1);
        assert!(cleanups.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }
}
